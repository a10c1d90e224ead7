// ==========================================
// 商业案例计算引擎 - API 层
// ==========================================
// 职责: 提供业务 API 接口，校验入参并映射错误
// ==========================================

pub mod business_case_api;
pub mod error;

// 重导出核心类型
pub use business_case_api::{BusinessCaseApi, DeterminationInput, EquipmentSelectionResult};
pub use error::{ApiError, ApiResult};
