// ==========================================
// 商业案例计算引擎 - 引擎层
// ==========================================
// 职责: 公式求值、公式选择、案例计算、一致性校验、工作流编排
// 红线: 公式求值为纯函数，查表只发生在变量解析阶段
// 红线: 每个主迁移单事务，次级重算只记录不传播
// ==========================================

pub mod calculator;
pub mod error;
pub mod formula;
pub mod formula_policy;
pub mod orchestrator;
pub mod validation;

// 重导出核心引擎
pub use calculator::BusinessCaseCalculator;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use formula::{Formula, FormulaError, FormulaEvaluator, FormulaValidation};
pub use formula_policy::{ApplicableFormula, FormulaPolicy};
pub use orchestrator::{ApprovalDecision, BusinessCaseOrchestrator, RecalculationOutcome};
pub use validation::ValidationEngine;
