// ==========================================
// 商业案例计算引擎 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换引擎/仓储错误为用户友好的错误消息
// 约束: 每条错误信息必须带出错对象（案例ID/测定项/字段）
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入与业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("前置条件不满足: {0}")]
    PreconditionFailed(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 公式错误
    // ==========================================
    #[error("公式执行失败 ({owner}): {message}")]
    FormulaError { owner: String, message: String },

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("版本冲突: {0}")]
    VersionConflict(String),

    #[error("操作已取消: {0}")]
    Cancelled(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::SnapshotVersionConflict {
                business_case_id,
                expected,
                actual,
            } => ApiError::VersionConflict(format!(
                "案例{}的计算快照已被其他操作更新（期望version={:?}，实际version={:?}）",
                business_case_id, expected, actual
            )),

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 数据质量错误
            RepositoryError::DataFormatError { field, message } => {
                ApiError::ValidationError(format!("字段{}格式错误: {}", field, message))
            }
            RepositoryError::InvalidIdentifier(msg) => {
                ApiError::InvalidInput(format!("非法查询标识符: {}", msg))
            }
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidInput { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            EngineError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            EngineError::InvalidStateTransition { from, to, .. } => {
                ApiError::InvalidStateTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                }
            }
            e @ (EngineError::MissingPrerequisite { .. }
            | EngineError::MissingCalculation(_)
            | EngineError::MissingOperationalData(_)
            | EngineError::ZeroCapacity(_)) => ApiError::PreconditionFailed(e.to_string()),
            EngineError::Formula { owner, source } => ApiError::FormulaError {
                owner,
                message: source.to_string(),
            },
            e @ EngineError::Overflow { .. } => ApiError::InvalidInput(e.to_string()),
            e @ EngineError::ConcurrentRecalculation { .. } => {
                ApiError::VersionConflict(e.to_string())
            }
            EngineError::Cancelled(bc_id) => ApiError::Cancelled(format!("bc_id={}", bc_id)),
            EngineError::Repository(repo) => ApiError::from(repo),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Stage;
    use crate::engine::formula::FormulaError;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "BusinessCase".to_string(),
            id: "bc-1".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("BusinessCase"));
                assert!(msg.contains("bc-1"));
            }
            _ => panic!("Expected NotFound"),
        }

        let repo_err = RepositoryError::SnapshotVersionConflict {
            business_case_id: "bc-1".to_string(),
            expected: Some(1),
            actual: Some(2),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::VersionConflict(msg) => {
                assert!(msg.contains("bc-1"));
                assert!(msg.contains("已被其他操作更新"));
            }
            _ => panic!("Expected VersionConflict"),
        }
    }

    #[test]
    fn test_engine_error_conversion() {
        let api_err: ApiError = EngineError::InvalidStateTransition {
            bc_id: "bc-1".to_string(),
            from: Stage::Draft,
            to: Stage::PendingManagerApproval,
        }
        .into();
        assert!(matches!(api_err, ApiError::InvalidStateTransition { .. }));

        let api_err: ApiError =
            EngineError::formula("determination:det-1/cost", FormulaError::NoConditionMatched)
                .into();
        match api_err {
            ApiError::FormulaError { owner, .. } => {
                assert_eq!(owner, "determination:det-1/cost");
            }
            _ => panic!("Expected FormulaError"),
        }

        let api_err: ApiError = EngineError::MissingCalculation("bc-1".to_string()).into();
        assert!(matches!(api_err, ApiError::PreconditionFailed(_)));

        let api_err: ApiError = EngineError::ConcurrentRecalculation {
            bc_id: "bc-1".to_string(),
            expected: Some(1),
            actual: Some(2),
        }
        .into();
        assert!(matches!(api_err, ApiError::VersionConflict(_)));
    }
}
