// ==========================================
// 公式引擎 - 错误类型
// ==========================================

use thiserror::Error;

/// 公式解析/求值错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("未知公式类型: {0}")]
    UnknownFormulaType(String),

    #[error("未知计算类别: {0}")]
    UnknownCalculationKind(String),

    #[error("缺少必填变量: {0}")]
    MissingRequiredVariable(String),

    #[error("表达式包含禁止的结构: {0}")]
    DisallowedConstruct(String),

    #[error("表达式语法错误 (位置 {position}): {message}")]
    Syntax { position: usize, message: String },

    #[error("未定义变量: {0}")]
    UndefinedVariable(String),

    #[error("变量 {name} 不是数值: {value}")]
    NonNumericVariable { name: String, value: String },

    #[error("函数 {function} 参数个数错误: 期望 {expected}, 实际 {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("算术错误: {0}")]
    Arithmetic(String),

    #[error("没有满足的条件规则")]
    NoConditionMatched,

    #[error("管道步骤 \"{step}\" 失败: {source}")]
    PipelineStep {
        step: String,
        #[source]
        source: Box<FormulaError>,
    },

    #[error("公式定义无效: {0}")]
    InvalidDefinition(String),
}

impl FormulaError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        FormulaError::Syntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn arithmetic(message: impl Into<String>) -> Self {
        FormulaError::Arithmetic(message.into())
    }
}

/// Result 类型别名
pub type FormulaResult<T> = Result<T, FormulaError>;
