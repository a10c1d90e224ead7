// ==========================================
// 公式引擎 - 公式与变量定义
// ==========================================
// JSON 形态:
// {type, expression?|rules?|steps?|formula?,
//  variables: {name: {source, table?, key?, value?, default?, required?, type?}},
//  unit?, description?}
// ==========================================

use super::error::{FormulaError, FormulaResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 求值上下文（调用方提供的原始值）
pub type FormulaContext = BTreeMap<String, serde_json::Value>;

/// 解析后的数值变量
pub type ResolvedVariables = BTreeMap<String, Decimal>;

// ==========================================
// Formula
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    #[serde(flatten)]
    pub body: FormulaBody,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormulaBody {
    Expression { expression: String },
    Conditional { rules: Vec<ConditionalRule> },
    Pipeline { steps: Vec<PipelineStep> },
    Hybrid { formula: String },
}

impl FormulaBody {
    pub const KNOWN_TYPES: [&'static str; 4] = ["expression", "conditional", "pipeline", "hybrid"];

    pub fn type_name(&self) -> &'static str {
        match self {
            FormulaBody::Expression { .. } => "expression",
            FormulaBody::Conditional { .. } => "conditional",
            FormulaBody::Pipeline { .. } => "pipeline",
            FormulaBody::Hybrid { .. } => "hybrid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRule {
    pub condition: String,
    pub formula: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub name: String,
    pub formula: String,
    pub output: String,
}

impl Formula {
    /// 单表达式公式
    pub fn expression(expression: impl Into<String>) -> Self {
        Self {
            body: FormulaBody::Expression {
                expression: expression.into(),
            },
            variables: BTreeMap::new(),
            unit: None,
            description: None,
        }
    }

    pub fn with_variable(mut self, name: &str, spec: VariableSpec) -> Self {
        self.variables.insert(name.to_string(), spec);
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.body.type_name()
    }

    /// 从 JSON 文档解析公式
    ///
    /// 先检查 type 字段，未知类型返回 UnknownFormulaType，
    /// 其余结构问题返回 InvalidDefinition。
    pub fn from_value(value: &serde_json::Value) -> FormulaResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| FormulaError::InvalidDefinition("公式必须是 JSON 对象".to_string()))?;

        let type_name = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FormulaError::InvalidDefinition("缺少 type 字段".to_string()))?;

        if !FormulaBody::KNOWN_TYPES.contains(&type_name) {
            return Err(FormulaError::UnknownFormulaType(type_name.to_string()));
        }

        serde_json::from_value(value.clone())
            .map_err(|e| FormulaError::InvalidDefinition(e.to_string()))
    }

    /// 公式主体，用于计算明细留痕
    pub fn body_for_details(&self) -> serde_json::Value {
        match &self.body {
            FormulaBody::Expression { expression } => serde_json::Value::String(expression.clone()),
            FormulaBody::Hybrid { formula } => serde_json::Value::String(formula.clone()),
            other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
        }
    }
}

// ==========================================
// VariableSpec
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariableSpec {
    #[serde(default)]
    pub source: VariableSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// 查表时读取的列
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

impl VariableSpec {
    /// 必填的上下文变量
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// 指向 `table.column` 的路径变量
    pub fn path(path: &str) -> Self {
        Self {
            source: VariableSource::from(path.to_string()),
            ..Default::default()
        }
    }

    pub fn lookup(table: &str, key: &str, value_column: &str) -> Self {
        Self {
            source: VariableSource::Lookup,
            table: Some(table.to_string()),
            key: Some(key.to_string()),
            value: Some(value_column.to_string()),
            ..Default::default()
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn mark_required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// 变量来源
///
/// 序列化为字符串：`literal` / `context` / `lookup` / `table.column`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VariableSource {
    Literal,
    Context,
    Lookup,
    Path { table: String, column: String },
}

impl Default for VariableSource {
    fn default() -> Self {
        VariableSource::Literal
    }
}

impl From<String> for VariableSource {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "lookup" => VariableSource::Lookup,
            "context" => VariableSource::Context,
            s if s.contains('.') => {
                let (table, column) = s.rsplit_once('.').unwrap_or(("", s));
                VariableSource::Path {
                    table: table.to_string(),
                    column: column.to_string(),
                }
            }
            _ => VariableSource::Literal,
        }
    }
}

impl From<VariableSource> for String {
    fn from(source: VariableSource) -> Self {
        match source {
            VariableSource::Literal => "literal".to_string(),
            VariableSource::Context => "context".to_string(),
            VariableSource::Lookup => "lookup".to_string(),
            VariableSource::Path { table, column } => format!("{}.{}", table, column),
        }
    }
}
