// ==========================================
// 商业案例计算引擎 - 灵活公式引擎
// ==========================================
// 职责: 数据驱动公式的安全求值
// 组成:
// - types:     公式/变量定义（JSON 映射）
// - lexer:     词法分析（拒绝代码执行原语）
// - parser:    封闭语法的表达式解析（函数白名单）
// - expr_eval: 十进制算术求值
// - resolver:  变量解析（上下文 -> 查表 -> 路径 -> 默认值）
// - evaluator: expression / conditional / pipeline / hybrid 执行
// ==========================================

mod error;
mod evaluator;
mod expr_eval;
mod lexer;
mod parser;
mod resolver;
mod types;

#[cfg(test)]
mod tests;

pub use error::{FormulaError, FormulaResult};
pub use evaluator::{FormulaEvaluator, FormulaExecution, FormulaValidation};
pub use expr_eval::decimal_to_f64;
pub use parser::{parse_expression, BinaryOp, Expr, Function, UnaryOp};
pub use resolver::{json_to_decimal, LookupSource, NoLookup, VariableResolver};
pub use types::{
    ConditionalRule, Formula, FormulaBody, FormulaContext, PipelineStep, ResolvedVariables,
    VariableSource, VariableSpec,
};
