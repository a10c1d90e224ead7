use super::*;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::cell::Cell;
use std::error::Error;
use std::str::FromStr;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn ctx(value: Value) -> FormulaContext {
    serde_json::from_value(value).unwrap()
}

/// 固定返回值的查表桩，记录调用次数
struct StubLookup {
    result: Result<Option<Value>, String>,
    calls: Cell<usize>,
}

impl StubLookup {
    fn hit(v: Value) -> Self {
        Self { result: Ok(Some(v)), calls: Cell::new(0) }
    }
    fn miss() -> Self {
        Self { result: Ok(None), calls: Cell::new(0) }
    }
    fn failing() -> Self {
        Self { result: Err("连接中断".to_string()), calls: Cell::new(0) }
    }
}

impl LookupSource for StubLookup {
    fn lookup(
        &self,
        _table: &str,
        _key_column: &str,
        _value_column: &str,
        _key: &Value,
    ) -> Result<Option<Value>, Box<dyn Error + Send + Sync>> {
        self.calls.set(self.calls.get() + 1);
        self.result.clone().map_err(|e| e.into())
    }
}

// ==========================================
// 公式 JSON 解析
// ==========================================

#[test]
fn test_formula_from_json_expression() {
    let formula = Formula::from_value(&json!({
        "type": "expression",
        "expression": "a * b",
        "variables": {
            "a": {"source": "catalog_determinations.volume_per_test", "default": 1},
            "b": {"required": true}
        },
        "unit": "mL"
    }))
    .unwrap();

    assert_eq!(formula.type_name(), "expression");
    assert_eq!(formula.unit.as_deref(), Some("mL"));
    assert_eq!(
        formula.variables["a"].source,
        VariableSource::Path {
            table: "catalog_determinations".to_string(),
            column: "volume_per_test".to_string()
        }
    );
    assert!(formula.variables["b"].required);
}

#[test]
fn test_unknown_formula_type() {
    let err = Formula::from_value(&json!({"type": "script", "code": "1"})).unwrap_err();
    assert_eq!(err, FormulaError::UnknownFormulaType("script".to_string()));
}

#[test]
fn test_malformed_formula_is_invalid_definition() {
    let err = Formula::from_value(&json!({"type": "pipeline"})).unwrap_err();
    assert!(matches!(err, FormulaError::InvalidDefinition(_)));
    let err = Formula::from_value(&json!("a + b")).unwrap_err();
    assert!(matches!(err, FormulaError::InvalidDefinition(_)));
}

#[test]
fn test_formula_serializes_with_type_tag() {
    let formula = Formula::expression("x + 1").with_unit("USD");
    let value = serde_json::to_value(&formula).unwrap();
    assert_eq!(value["type"], "expression");
    assert_eq!(value["expression"], "x + 1");
    assert_eq!(Formula::from_value(&value).unwrap(), formula);
}

// ==========================================
// 变量解析
// ==========================================

#[test]
fn test_context_value_wins_over_everything() {
    let lookup = StubLookup::hit(json!(99));
    let mut spec = VariableSpec::lookup("prices", "code", "price");
    spec.default = Some(json!(5));
    let formula = Formula::expression("price").with_variable("price", spec);

    let out = FormulaEvaluator::new()
        .execute(&formula, &ctx(json!({"price": 7, "code": "A"})), &lookup)
        .unwrap();
    assert_eq!(out.value, d("7"));
    assert_eq!(lookup.calls.get(), 0, "上下文命中时不应查表");
}

#[test]
fn test_lookup_hit_used_when_context_absent() {
    let lookup = StubLookup::hit(json!(12.5));
    let spec = VariableSpec::lookup("prices", "code", "price").with_default(json!(5));
    let formula = Formula::expression("price * 2").with_variable("price", spec);

    let out = FormulaEvaluator::new()
        .execute(&formula, &ctx(json!({"code": "A"})), &lookup)
        .unwrap();
    assert_eq!(out.value, d("25"));
    assert_eq!(lookup.calls.get(), 1);
}

#[test]
fn test_lookup_failure_falls_back_to_default() {
    let lookup = StubLookup::failing();
    let spec = VariableSpec::lookup("prices", "code", "price").with_default(json!(5));
    let formula = Formula::expression("price").with_variable("price", spec);

    let out = FormulaEvaluator::new()
        .execute(&formula, &ctx(json!({"code": "A"})), &lookup)
        .unwrap();
    assert_eq!(out.value, d("5"));
}

#[test]
fn test_lookup_miss_without_default_is_zero_when_optional() {
    let lookup = StubLookup::miss();
    let spec = VariableSpec::lookup("prices", "code", "price");
    let formula = Formula::expression("price + 1").with_variable("price", spec);

    let out = FormulaEvaluator::new()
        .execute(&formula, &ctx(json!({"code": "A"})), &lookup)
        .unwrap();
    assert_eq!(out.value, d("1"));
}

#[test]
fn test_path_source_reads_trailing_segment() {
    let formula = Formula::expression("v")
        .with_variable("v", VariableSpec::path("catalog_determinations.volume_per_test"));
    let out = FormulaEvaluator::new()
        .execute(&formula, &ctx(json!({"volume_per_test": 3})), &NoLookup)
        .unwrap();
    assert_eq!(out.value, d("3"));
}

#[test]
fn test_resolution_priority_falls_through() {
    // 上下文 > 路径 > 默认值
    let spec = VariableSpec::path("t.col").with_default(json!(1));
    let formula = Formula::expression("v").with_variable("v", spec);
    let evaluator = FormulaEvaluator::new();

    let both = evaluator
        .execute(&formula, &ctx(json!({"v": 10, "col": 20})), &NoLookup)
        .unwrap();
    assert_eq!(both.value, d("10"));

    let path_only = evaluator
        .execute(&formula, &ctx(json!({"col": 20})), &NoLookup)
        .unwrap();
    assert_eq!(path_only.value, d("20"));

    let nothing = evaluator.execute(&formula, &ctx(json!({})), &NoLookup).unwrap();
    assert_eq!(nothing.value, d("1"));
}

#[test]
fn test_required_variable_missing() {
    let formula = Formula::expression("q * 2").with_variable("q", VariableSpec::required());
    let err = FormulaEvaluator::new()
        .execute(&formula, &ctx(json!({"q": null})), &NoLookup)
        .unwrap_err();
    assert_eq!(err, FormulaError::MissingRequiredVariable("q".to_string()));
}

#[test]
fn test_required_variable_satisfied_by_default() {
    let spec = VariableSpec::required().with_default(json!(4));
    let formula = Formula::expression("q * 2").with_variable("q", spec);
    let out = FormulaEvaluator::new().execute(&formula, &ctx(json!({})), &NoLookup).unwrap();
    assert_eq!(out.value, d("8"));
}

#[test]
fn test_non_numeric_variable() {
    let formula = Formula::expression("q").with_variable("q", VariableSpec::required());
    let err = FormulaEvaluator::new()
        .execute(&formula, &ctx(json!({"q": "abc"})), &NoLookup)
        .unwrap_err();
    assert!(matches!(err, FormulaError::NonNumericVariable { .. }));
}

#[test]
fn test_numeric_string_and_bool_are_accepted() {
    let formula = Formula::expression("q + flag")
        .with_variable("q", VariableSpec::required())
        .with_variable("flag", VariableSpec::default());
    let out = FormulaEvaluator::new()
        .execute(&formula, &ctx(json!({"q": "2.5", "flag": true})), &NoLookup)
        .unwrap();
    assert_eq!(out.value, d("3.5"));
}

// ==========================================
// 条件与管道
// ==========================================

fn conditional() -> Formula {
    Formula::from_value(&json!({
        "type": "conditional",
        "rules": [
            {"condition": "missing_var > 1", "formula": "1000"},
            {"condition": "q > 100", "formula": "q * 0.9"},
            {"condition": "q > 10", "formula": "q / 0"},
            {"condition": "true", "formula": "q"}
        ]
    }))
    .unwrap()
}

#[test]
fn test_conditional_first_truthy_wins_and_failing_rules_skipped() {
    let evaluator = FormulaEvaluator::new();
    let mut vars = ResolvedVariables::new();

    vars.insert("q".to_string(), d("200"));
    assert_eq!(evaluator.evaluate(&conditional(), &vars).unwrap(), d("180"));

    // q=50: 第三条公式除零被跳过，落到兜底规则
    vars.insert("q".to_string(), d("50"));
    assert_eq!(evaluator.evaluate(&conditional(), &vars).unwrap(), d("50"));
}

#[test]
fn test_conditional_no_match() {
    let formula = Formula::from_value(&json!({
        "type": "conditional",
        "rules": [{"condition": "0", "formula": "1"}]
    }))
    .unwrap();
    let err = FormulaEvaluator::new()
        .evaluate(&formula, &ResolvedVariables::new())
        .unwrap_err();
    assert_eq!(err, FormulaError::NoConditionMatched);
}

#[test]
fn test_pipeline_chaining() {
    let formula = Formula::from_value(&json!({
        "type": "pipeline",
        "steps": [
            {"name": "base", "formula": "x * 2", "output": "doubled"},
            {"name": "plus", "formula": "doubled + 3", "output": "result"}
        ]
    }))
    .unwrap();
    let mut vars = ResolvedVariables::new();
    vars.insert("x".to_string(), d("5"));
    assert_eq!(FormulaEvaluator::new().evaluate(&formula, &vars).unwrap(), d("13"));
}

#[test]
fn test_pipeline_step_error_names_step() {
    let formula = Formula::from_value(&json!({
        "type": "pipeline",
        "steps": [
            {"name": "ok", "formula": "1", "output": "a"},
            {"name": "broken", "formula": "a / 0", "output": "b"}
        ]
    }))
    .unwrap();
    let err = FormulaEvaluator::new()
        .evaluate(&formula, &ResolvedVariables::new())
        .unwrap_err();
    match err {
        FormulaError::PipelineStep { step, .. } => assert_eq!(step, "broken"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_hybrid_is_expression_alias() {
    let formula = Formula::from_value(&json!({"type": "hybrid", "formula": "2 + 3 * 4"})).unwrap();
    assert_eq!(
        FormulaEvaluator::new()
            .evaluate(&formula, &ResolvedVariables::new())
            .unwrap(),
        d("14")
    );
}

// ==========================================
// 安全与确定性
// ==========================================

#[test]
fn test_code_execution_primitives_rejected() {
    let evaluator = FormulaEvaluator::new();
    for expression in ["import('fs')", "eval('1')", "require(x)", "parse(1)"] {
        let formula = Formula::expression(expression);
        let err = evaluator.evaluate(&formula, &ResolvedVariables::new()).unwrap_err();
        assert!(
            matches!(err, FormulaError::DisallowedConstruct(_)),
            "{expression} 应被拒绝"
        );
    }
}

#[test]
fn test_evaluation_is_deterministic() {
    let formula = Formula::expression("(a + b * 0.5) * c / 3");
    let mut vars = ResolvedVariables::new();
    vars.insert("a".to_string(), d("1.1"));
    vars.insert("b".to_string(), d("2.2"));
    vars.insert("c".to_string(), d("3.3"));

    let evaluator = FormulaEvaluator::new();
    let first = evaluator.evaluate(&formula, &vars).unwrap();
    for _ in 0..20 {
        assert_eq!(evaluator.evaluate(&formula, &vars).unwrap(), first);
    }
}

// ==========================================
// 公式试算
// ==========================================

#[test]
fn test_validate_formula_ok() {
    let validation = FormulaEvaluator::new().validate_formula(
        &json!({"type": "expression", "expression": "a * 3", "variables": {"a": {"required": true}}}),
        &ctx(json!({"a": 2})),
        &NoLookup,
    );
    assert!(validation.is_valid);
    assert_eq!(validation.result, Some(6.0));
    assert!(validation.error.is_none());
}

#[test]
fn test_validate_formula_reports_error() {
    let validation = FormulaEvaluator::new().validate_formula(
        &json!({"type": "expression", "expression": "a * 3", "variables": {"a": {"required": true}}}),
        &ctx(json!({})),
        &NoLookup,
    );
    assert!(!validation.is_valid);
    assert!(validation.result.is_none());
    assert!(validation.error.unwrap().contains("a"));
}
