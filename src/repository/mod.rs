// ==========================================
// 商业案例计算引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 事务: 每个仓储提供 `*_tx(&Connection, ..)` 函数，
//       由编排层在同一事务内组合多次写入
// ==========================================

pub mod business_case_repo;
pub mod calculation_repo;
pub mod determination_repo;
pub mod error;
pub mod investment_repo;
pub mod lookup_repo;
pub mod operational_repo;
pub mod reference_repo;
pub mod selection_repo;
pub mod template_repo;
pub mod validation_repo;
pub mod workflow_history_repo;

// 重导出核心仓储
pub use business_case_repo::{BusinessCaseRepository, CompletionFlag};
pub use calculation_repo::CalculationRepository;
pub use determination_repo::BcDeterminationRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use investment_repo::InvestmentRepository;
pub use lookup_repo::SqliteLookupSource;
pub use operational_repo::OperationalDataRepository;
pub use reference_repo::ReferenceDataRepository;
pub use selection_repo::EquipmentSelectionRepository;
pub use template_repo::CalculationTemplateRepository;
pub use validation_repo::ValidationRepository;
pub use workflow_history_repo::WorkflowHistoryRepository;

use chrono::{NaiveDateTime, Timelike, Utc};
use rusqlite::types::Type;

/// 当前 UTC 时间（秒精度，与 SQLite datetime 对齐）
pub fn current_timestamp() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

/// 文本列 -> 枚举
pub(crate) fn parse_enum_column<T>(
    idx: usize,
    raw: &str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("无效枚举值: {}", raw).into(),
        )
    })
}

/// 文本列 -> JSON
pub(crate) fn parse_json_column(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<serde_json::Value>> {
    match raw {
        None => Ok(None),
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}
