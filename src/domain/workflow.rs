// ==========================================
// 商业案例计算引擎 - 工作流历史
// ==========================================
// 红线: 只追加，不修改、不删除
// ==========================================

use crate::domain::types::Stage;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowHistoryEntry {
    pub id: i64,
    pub business_case_id: String,
    pub from_stage: Option<Stage>,
    pub to_stage: Stage,
    pub changed_by: String,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

/// 待写入的历史条目
#[derive(Debug, Clone)]
pub struct NewWorkflowHistoryEntry<'a> {
    pub business_case_id: &'a str,
    pub from_stage: Option<Stage>,
    pub to_stage: Stage,
    pub changed_by: &'a str,
    pub notes: Option<&'a str>,
}
