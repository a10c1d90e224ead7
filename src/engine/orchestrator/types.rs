// ==========================================
// 工作流编排器 - 结果类型
// ==========================================

use crate::domain::calculation::BusinessCaseCalculation;
use crate::domain::determination::DeterminationAdjustment;
use crate::domain::types::Stage;
use crate::domain::validation::ValidationOutcome;
use serde::{Deserialize, Serialize};

/// 经济审批结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub roi_percentage: f64,
    pub target_margin_percentage: f64,
    pub new_stage: Stage,
}

/// 运营数据重算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalculationOutcome {
    pub adjustments: Vec<DeterminationAdjustment>,
    pub calculation: BusinessCaseCalculation,
    pub validation: ValidationOutcome,
    pub new_stage: Stage,
}
