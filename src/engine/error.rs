// ==========================================
// 商业案例计算引擎 - 引擎层错误类型
// ==========================================
// 职责: 计算器/校验/编排错误，附带出错的案例或测定项标识
// 分类: ErrorKind（输入/未找到/前置条件/公式执行/持久化/并发冲突）
// ==========================================

use crate::domain::types::Stage;
use crate::engine::formula::FormulaError;
use crate::repository::error::RepositoryError;
use serde::Serialize;
use thiserror::Error;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationInput,
    NotFound,
    Precondition,
    FormulaExecution,
    Persistence,
    Conflict,
}

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 输入 =====
    #[error("无效输入 (field={field}): {message}")]
    InvalidInput { field: String, message: String },

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    // ===== 前置条件 =====
    #[error("前置条件不满足: bc_id={bc_id}, {message}")]
    MissingPrerequisite { bc_id: String, message: String },

    #[error("尚未计算 ROI: bc_id={0}")]
    MissingCalculation(String),

    #[error("缺少运营数据: bc_id={0}")]
    MissingOperationalData(String),

    #[error("无效的阶段迁移: bc_id={bc_id}, from={from} to={to}")]
    InvalidStateTransition { bc_id: String, from: Stage, to: Stage },

    #[error("设备无可用产能: equipment_id={0}")]
    ZeroCapacity(String),

    // ===== 公式 =====
    #[error("公式执行失败 ({owner}): {source}")]
    Formula {
        owner: String,
        #[source]
        source: FormulaError,
    },

    #[error("数值溢出: bc_id={bc_id}, step={step}")]
    Overflow { bc_id: String, step: String },

    // ===== 并发 =====
    #[error("计算快照已被并发更新: bc_id={bc_id}, expected_version={expected:?}, actual_version={actual:?}")]
    ConcurrentRecalculation {
        bc_id: String,
        expected: Option<i64>,
        actual: Option<i64>,
    },

    #[error("计算已取消: bc_id={0}")]
    Cancelled(String),

    // ===== 持久化 =====
    #[error(transparent)]
    Repository(RepositoryError),
}

impl EngineError {
    pub fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    pub fn missing_prerequisite(bc_id: &str, message: impl Into<String>) -> Self {
        EngineError::MissingPrerequisite {
            bc_id: bc_id.to_string(),
            message: message.into(),
        }
    }

    pub fn formula(owner: impl Into<String>, source: FormulaError) -> Self {
        EngineError::Formula {
            owner: owner.into(),
            source,
        }
    }

    pub fn overflow(bc_id: &str, step: &str) -> Self {
        EngineError::Overflow {
            bc_id: bc_id.to_string(),
            step: step.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInput { .. } => ErrorKind::ValidationInput,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::MissingPrerequisite { .. }
            | EngineError::MissingCalculation(_)
            | EngineError::MissingOperationalData(_)
            | EngineError::InvalidStateTransition { .. }
            | EngineError::ZeroCapacity(_)
            | EngineError::Cancelled(_) => ErrorKind::Precondition,
            EngineError::Formula { .. } | EngineError::Overflow { .. } => {
                ErrorKind::FormulaExecution
            }
            EngineError::ConcurrentRecalculation { .. } => ErrorKind::Conflict,
            EngineError::Repository(RepositoryError::NotFound { .. }) => ErrorKind::NotFound,
            EngineError::Repository(_) => ErrorKind::Persistence,
        }
    }
}

// 仓储错误: 快照版本冲突单独映射为并发冲突
impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::SnapshotVersionConflict {
                business_case_id,
                expected,
                actual,
            } => EngineError::ConcurrentRecalculation {
                bc_id: business_case_id,
                expected,
                actual,
            },
            RepositoryError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Repository(other),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::from(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_conflict_maps_to_conflict_kind() {
        let err: EngineError = RepositoryError::SnapshotVersionConflict {
            business_case_id: "bc-1".to_string(),
            expected: Some(1),
            actual: Some(2),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(matches!(err, EngineError::ConcurrentRecalculation { .. }));
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            EngineError::invalid_input("client_name", "不能为空").kind(),
            ErrorKind::ValidationInput
        );
        assert_eq!(
            EngineError::from(RepositoryError::not_found("BusinessCase", "x")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::MissingCalculation("bc-1".into()).kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            EngineError::formula("det-1", FormulaError::NoConditionMatched).kind(),
            ErrorKind::FormulaExecution
        );
        assert_eq!(
            EngineError::from(RepositoryError::LockError("poisoned".into())).kind(),
            ErrorKind::Persistence
        );
    }
}
