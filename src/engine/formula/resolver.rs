// ==========================================
// 公式引擎 - 变量解析
// ==========================================
// 解析顺序（逐变量）:
// 1. 上下文中存在非空值 -> 直接使用
// 2. source = lookup     -> 单列点查；失败/无结果降级为默认值（记录告警，不抛错）
// 3. source = table.col  -> 上下文[col] ?? 默认值
// 4. 其它                -> 上下文[name] ?? 默认值
// 解析后仍为空: 必填 -> MissingRequiredVariable；非必填 -> 0
// ==========================================

use super::error::{FormulaError, FormulaResult};
use super::types::{FormulaContext, ResolvedVariables, VariableSource, VariableSpec};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::str::FromStr;
use tracing::{debug, warn};

// ==========================================
// LookupSource - 查表数据源
// ==========================================
// 实现者: repository::lookup_repo::SqliteLookupSource
pub trait LookupSource {
    /// 单列点查: SELECT value_column FROM table WHERE key_column = key
    ///
    /// # 返回
    /// - Ok(Some(v)): 命中
    /// - Ok(None): 未命中或值为空
    /// - Err: 读取失败（调用方降级为默认值）
    fn lookup(
        &self,
        table: &str,
        key_column: &str,
        value_column: &str,
        key: &Value,
    ) -> Result<Option<Value>, Box<dyn Error + Send + Sync>>;
}

/// 无查表数据源（纯内存求值、公式试算）
pub struct NoLookup;

impl LookupSource for NoLookup {
    fn lookup(
        &self,
        table: &str,
        _key_column: &str,
        _value_column: &str,
        _key: &Value,
    ) -> Result<Option<Value>, Box<dyn Error + Send + Sync>> {
        Err(format!("未配置查表数据源: {}", table).into())
    }
}

// ==========================================
// VariableResolver
// ==========================================
pub struct VariableResolver<'a> {
    lookup: &'a dyn LookupSource,
}

impl<'a> VariableResolver<'a> {
    pub fn new(lookup: &'a dyn LookupSource) -> Self {
        Self { lookup }
    }

    /// 解析公式声明的全部变量
    ///
    /// # 参数
    /// - `specs`: 变量声明
    /// - `context`: 调用方上下文
    ///
    /// # 返回
    /// 变量名 -> 数值
    pub fn resolve(
        &self,
        specs: &BTreeMap<String, VariableSpec>,
        context: &FormulaContext,
    ) -> FormulaResult<ResolvedVariables> {
        let mut resolved = ResolvedVariables::new();

        for (name, spec) in specs {
            let raw = self.resolve_raw(name, spec, context);
            let value = match raw {
                Some(v) => json_to_decimal(name, &v)?,
                None if spec.required => {
                    return Err(FormulaError::MissingRequiredVariable(name.clone()))
                }
                None => Decimal::ZERO,
            };
            resolved.insert(name.clone(), value);
        }

        Ok(resolved)
    }

    /// 解析单个变量的原始值（未做数值转换）
    fn resolve_raw(&self, name: &str, spec: &VariableSpec, context: &FormulaContext) -> Option<Value> {
        if let Some(v) = present(context.get(name)) {
            return Some(v.clone());
        }

        let fallback = || present(spec.default.as_ref()).cloned();

        match &spec.source {
            VariableSource::Lookup => self.lookup_or_default(name, spec, context).or_else(fallback),
            VariableSource::Path { column, .. } => present(context.get(column))
                .cloned()
                .or_else(fallback),
            VariableSource::Literal | VariableSource::Context => fallback(),
        }
    }

    fn lookup_or_default(
        &self,
        name: &str,
        spec: &VariableSpec,
        context: &FormulaContext,
    ) -> Option<Value> {
        let (table, key_column, value_column) =
            match (spec.table.as_deref(), spec.key.as_deref(), spec.value.as_deref()) {
                (Some(t), Some(k), Some(v)) => (t, k, v),
                _ => {
                    warn!(variable = %name, "查表变量缺少 table/key/value 定义，使用默认值");
                    return None;
                }
            };

        let key_value = match present(context.get(key_column)) {
            Some(v) => v,
            None => {
                warn!(
                    variable = %name,
                    key = %key_column,
                    "查表键在上下文中不存在，使用默认值"
                );
                return None;
            }
        };

        match self.lookup.lookup(table, key_column, value_column, key_value) {
            Ok(Some(v)) => {
                debug!(variable = %name, table = %table, "查表命中");
                Some(v)
            }
            Ok(None) => {
                warn!(variable = %name, table = %table, "查表无结果，使用默认值");
                None
            }
            Err(e) => {
                warn!(
                    variable = %name,
                    table = %table,
                    error = %e,
                    "查表失败，降级为默认值"
                );
                None
            }
        }
    }
}

/// 过滤 JSON null
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// JSON 值 -> Decimal
///
/// - 数字: 精确转换
/// - 布尔: 1 / 0
/// - 字符串: 按十进制（或科学计数法）解析
/// - 其它: NonNumericVariable
pub fn json_to_decimal(name: &str, value: &Value) -> FormulaResult<Decimal> {
    let non_numeric = || FormulaError::NonNumericVariable {
        name: name.to_string(),
        value: value.to_string(),
    };

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Decimal::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Decimal::from(u))
            } else {
                n.as_f64().and_then(Decimal::from_f64).ok_or_else(non_numeric)
            }
        }
        Value::Bool(b) => Ok(if *b { Decimal::ONE } else { Decimal::ZERO }),
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .map_err(|_| non_numeric())
        }
        _ => Err(non_numeric()),
    }
}

/// 上下文的数值投影（非数值项忽略）
pub(crate) fn numeric_projection(context: &FormulaContext) -> ResolvedVariables {
    context
        .iter()
        .filter_map(|(k, v)| match v {
            Value::Number(_) | Value::Bool(_) => json_to_decimal(k, v).ok().map(|d| (k.clone(), d)),
            _ => None,
        })
        .collect()
}
