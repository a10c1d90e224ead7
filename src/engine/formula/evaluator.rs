// ==========================================
// 公式引擎 - 公式执行器
// ==========================================
// 纯函数: 同一 (公式, 变量) 始终得到同一结果，不读写外部状态
// 查表只发生在变量解析阶段（execute），evaluate 本身不触碰存储
// ==========================================

use super::error::{FormulaError, FormulaResult};
use super::expr_eval::{decimal_to_f64, eval_expr, truthy};
use super::parser::parse_expression;
use super::resolver::{numeric_projection, LookupSource, VariableResolver};
use super::types::{Formula, FormulaBody, FormulaContext, ResolvedVariables};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 一次执行的产出
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaExecution {
    pub value: Decimal,
    /// 实际参与求值的变量（上下文数值投影 + 声明变量）
    pub variables: ResolvedVariables,
}

/// 公式试算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaValidation {
    pub is_valid: bool,
    pub result: Option<f64>,
    pub error: Option<String>,
}

// ==========================================
// FormulaEvaluator
// ==========================================
pub struct FormulaEvaluator {
    // 无状态
}

impl Default for FormulaEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl FormulaEvaluator {
    pub fn new() -> Self {
        Self {}
    }

    /// 对已解析变量求值
    ///
    /// # 参数
    /// - `formula`: 公式
    /// - `variables`: 已解析的数值变量
    pub fn evaluate(&self, formula: &Formula, variables: &ResolvedVariables) -> FormulaResult<Decimal> {
        match &formula.body {
            FormulaBody::Expression { expression } => self.evaluate_expression(expression, variables),
            FormulaBody::Hybrid { formula } => self.evaluate_expression(formula, variables),
            FormulaBody::Conditional { rules } => {
                for (index, rule) in rules.iter().enumerate() {
                    let matched = match self.evaluate_expression(&rule.condition, variables) {
                        Ok(v) => truthy(v),
                        Err(e) => {
                            warn!(rule = index, condition = %rule.condition, error = %e, "条件规则求值失败，跳过");
                            continue;
                        }
                    };
                    if !matched {
                        continue;
                    }
                    match self.evaluate_expression(&rule.formula, variables) {
                        Ok(v) => return Ok(v),
                        Err(e) => {
                            warn!(rule = index, formula = %rule.formula, error = %e, "条件规则公式求值失败，跳过");
                        }
                    }
                }
                Err(FormulaError::NoConditionMatched)
            }
            FormulaBody::Pipeline { steps } => {
                if steps.is_empty() {
                    return Err(FormulaError::InvalidDefinition("管道没有任何步骤".to_string()));
                }
                let mut running = variables.clone();
                let mut last = Decimal::ZERO;
                for step in steps {
                    let value = self
                        .evaluate_expression(&step.formula, &running)
                        .map_err(|e| FormulaError::PipelineStep {
                            step: step.name.clone(),
                            source: Box::new(e),
                        })?;
                    running.insert(step.output.clone(), value);
                    last = value;
                }
                Ok(last)
            }
        }
    }

    /// 解析变量后求值
    ///
    /// 求值作用域 = 上下文数值投影，再由声明变量覆盖
    pub fn execute(
        &self,
        formula: &Formula,
        context: &FormulaContext,
        lookup: &dyn LookupSource,
    ) -> FormulaResult<FormulaExecution> {
        let variables = self.resolve_scope(formula, context, lookup)?;
        let value = self.evaluate(formula, &variables)?;
        Ok(FormulaExecution { value, variables })
    }

    /// 构建求值作用域（变量解析阶段，可能触发查表）
    pub fn resolve_scope(
        &self,
        formula: &Formula,
        context: &FormulaContext,
        lookup: &dyn LookupSource,
    ) -> FormulaResult<ResolvedVariables> {
        let declared = VariableResolver::new(lookup).resolve(&formula.variables, context)?;
        let mut scope = numeric_projection(context);
        scope.extend(declared);
        Ok(scope)
    }

    /// 公式试算：走与生产一致的 execute 路径
    ///
    /// # 参数
    /// - `formula_json`: 公式 JSON 文档
    /// - `example_context`: 示例上下文
    pub fn validate_formula(
        &self,
        formula_json: &serde_json::Value,
        example_context: &FormulaContext,
        lookup: &dyn LookupSource,
    ) -> FormulaValidation {
        let outcome = Formula::from_value(formula_json)
            .and_then(|formula| self.execute(&formula, example_context, lookup))
            .and_then(|execution| decimal_to_f64(execution.value));

        match outcome {
            Ok(result) => FormulaValidation {
                is_valid: true,
                result: Some(result),
                error: None,
            },
            Err(e) => FormulaValidation {
                is_valid: false,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn evaluate_expression(&self, source: &str, variables: &ResolvedVariables) -> FormulaResult<Decimal> {
        let expr = parse_expression(source)?;
        eval_expr(&expr, variables)
    }
}
