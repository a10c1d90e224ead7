// ==========================================
// 公式引擎 - 十进制求值
// ==========================================
// 所有运算在 rust_decimal::Decimal 上进行，仅在边界转换为 f64
// 比较与逻辑运算返回 1 / 0；非零即真
// ==========================================

use super::error::{FormulaError, FormulaResult};
use super::parser::{BinaryOp, Expr, Function, UnaryOp};
use super::types::ResolvedVariables;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};

/// exp 参数低于该值时结果下溢为 0
const EXP_UNDERFLOW_BELOW: i64 = -66;

/// 对 AST 求值
pub fn eval_expr(expr: &Expr, variables: &ResolvedVariables) -> FormulaResult<Decimal> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Variable(name) => variables
            .get(name)
            .copied()
            .ok_or_else(|| FormulaError::UndefinedVariable(name.clone())),
        Expr::Unary { op, operand } => {
            let value = eval_expr(operand, variables)?;
            Ok(match op {
                UnaryOp::Neg => -value,
                UnaryOp::Plus => value,
                UnaryOp::Not => bool_to_decimal(!truthy(value)),
            })
        }
        Expr::Binary { op, lhs, rhs } => {
            let a = eval_expr(lhs, variables)?;
            let b = eval_expr(rhs, variables)?;
            apply_binary(*op, a, b)
        }
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|arg| eval_expr(arg, variables))
                .collect::<FormulaResult<Vec<_>>>()?;
            apply_function(*function, &values)
        }
    }
}

/// 真值判断：非零即真
pub fn truthy(value: Decimal) -> bool {
    !value.is_zero()
}

fn bool_to_decimal(value: bool) -> Decimal {
    if value {
        Decimal::ONE
    } else {
        Decimal::ZERO
    }
}

/// Decimal -> f64（边界转换）
pub fn decimal_to_f64(value: Decimal) -> FormulaResult<f64> {
    value
        .to_f64()
        .ok_or_else(|| FormulaError::arithmetic(format!("结果无法转换为浮点数: {}", value)))
}

fn overflow(op: &str) -> FormulaError {
    FormulaError::arithmetic(format!("{} 运算溢出", op))
}

fn apply_binary(op: BinaryOp, a: Decimal, b: Decimal) -> FormulaResult<Decimal> {
    match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(|| overflow("加法")),
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(|| overflow("减法")),
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(|| overflow("乘法")),
        BinaryOp::Div => divide(a, b),
        BinaryOp::Mod => modulo(a, b),
        BinaryOp::Pow => power(a, b),
        BinaryOp::Lt => Ok(bool_to_decimal(a < b)),
        BinaryOp::Le => Ok(bool_to_decimal(a <= b)),
        BinaryOp::Gt => Ok(bool_to_decimal(a > b)),
        BinaryOp::Ge => Ok(bool_to_decimal(a >= b)),
        BinaryOp::Eq => Ok(bool_to_decimal(a == b)),
        BinaryOp::Ne => Ok(bool_to_decimal(a != b)),
        BinaryOp::And => Ok(bool_to_decimal(truthy(a) && truthy(b))),
        BinaryOp::Or => Ok(bool_to_decimal(truthy(a) || truthy(b))),
    }
}

fn divide(a: Decimal, b: Decimal) -> FormulaResult<Decimal> {
    if b.is_zero() {
        return Err(FormulaError::arithmetic("除数为零"));
    }
    a.checked_div(b).ok_or_else(|| overflow("除法"))
}

/// 取模（结果符号跟随除数）: x - y * floor(x / y)
fn modulo(a: Decimal, b: Decimal) -> FormulaResult<Decimal> {
    if b.is_zero() {
        return Err(FormulaError::arithmetic("取模除数为零"));
    }
    let quotient = divide(a, b)?.floor();
    let product = b.checked_mul(quotient).ok_or_else(|| overflow("取模"))?;
    a.checked_sub(product).ok_or_else(|| overflow("取模"))
}

fn power(base: Decimal, exponent: Decimal) -> FormulaResult<Decimal> {
    if exponent.fract().is_zero() {
        let exp = exponent
            .to_i64()
            .ok_or_else(|| FormulaError::arithmetic(format!("指数过大: {}", exponent)))?;
        if base.is_zero() && exp < 0 {
            return Err(FormulaError::arithmetic("零的负数次幂"));
        }
        return base.checked_powi(exp).ok_or_else(|| overflow("幂"));
    }
    if base.is_sign_negative() && !base.is_zero() {
        return Err(FormulaError::arithmetic(format!(
            "负数 {} 不能取非整数次幂 {}",
            base, exponent
        )));
    }
    if base.is_zero() {
        return if exponent > Decimal::ZERO {
            Ok(Decimal::ZERO)
        } else {
            Err(FormulaError::arithmetic("零的负数次幂"))
        };
    }
    base.checked_powd(exponent).ok_or_else(|| overflow("幂"))
}

fn natural_log(value: Decimal) -> FormulaResult<Decimal> {
    if value <= Decimal::ZERO {
        return Err(FormulaError::arithmetic(format!("对数参数必须为正: {}", value)));
    }
    value.checked_ln().ok_or_else(|| overflow("对数"))
}

fn round_to(value: Decimal, digits: Decimal) -> FormulaResult<Decimal> {
    let dp = digits
        .to_u32()
        .filter(|d| digits.fract().is_zero() && *d <= 28)
        .ok_or_else(|| FormulaError::arithmetic(format!("round 小数位无效: {}", digits)))?;
    Ok(value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
}

fn median(values: &[Decimal]) -> FormulaResult<Decimal> {
    let mut sorted = values.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Ok(sorted[mid])
    } else {
        let total = sorted[mid - 1]
            .checked_add(sorted[mid])
            .ok_or_else(|| overflow("中位数"))?;
        divide(total, Decimal::TWO)
    }
}

fn sum(values: &[Decimal]) -> FormulaResult<Decimal> {
    values.iter().try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(*v).ok_or_else(|| overflow("求和"))
    })
}

fn product(values: &[Decimal]) -> FormulaResult<Decimal> {
    values.iter().try_fold(Decimal::ONE, |acc, v| {
        acc.checked_mul(*v).ok_or_else(|| overflow("乘法"))
    })
}

fn apply_function(function: Function, args: &[Decimal]) -> FormulaResult<Decimal> {
    // 参数个数已在解析期校验
    let arg = |i: usize| args.get(i).copied().unwrap_or(Decimal::ZERO);

    match function {
        Function::Add => sum(args),
        Function::Subtract => apply_binary(BinaryOp::Sub, arg(0), arg(1)),
        Function::Multiply => product(args),
        Function::Divide => divide(arg(0), arg(1)),
        Function::Pow => power(arg(0), arg(1)),
        Function::Mod => modulo(arg(0), arg(1)),
        Function::Sqrt => {
            let v = arg(0);
            if v.is_sign_negative() && !v.is_zero() {
                return Err(FormulaError::arithmetic(format!("负数不能开平方: {}", v)));
            }
            v.sqrt().ok_or_else(|| overflow("开平方"))
        }
        Function::Abs => Ok(arg(0).abs()),
        Function::Round => {
            if args.len() == 2 {
                round_to(arg(0), arg(1))
            } else {
                Ok(arg(0).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            }
        }
        Function::Floor => Ok(arg(0).floor()),
        Function::Ceil => Ok(arg(0).ceil()),
        Function::Min => args
            .iter()
            .copied()
            .min()
            .ok_or_else(|| FormulaError::arithmetic("min 缺少参数")),
        Function::Max => args
            .iter()
            .copied()
            .max()
            .ok_or_else(|| FormulaError::arithmetic("max 缺少参数")),
        Function::Sum => sum(args),
        Function::Mean => {
            let count = Decimal::from_usize(args.len()).ok_or_else(|| overflow("均值"))?;
            divide(sum(args)?, count)
        }
        Function::Median => median(args),
        Function::Log => {
            let ln_value = natural_log(arg(0))?;
            if args.len() == 2 {
                let ln_base = natural_log(arg(1))?;
                divide(ln_value, ln_base)
            } else {
                Ok(ln_value)
            }
        }
        Function::Log10 => {
            let v = arg(0);
            if v <= Decimal::ZERO {
                return Err(FormulaError::arithmetic(format!("对数参数必须为正: {}", v)));
            }
            v.checked_log10().ok_or_else(|| overflow("对数"))
        }
        Function::Exp => {
            let x = arg(0);
            if x < Decimal::from(EXP_UNDERFLOW_BELOW) {
                Ok(Decimal::ZERO)
            } else {
                x.checked_exp().ok_or_else(|| overflow("指数"))
            }
        }
        Function::Greater | Function::Larger => apply_binary(BinaryOp::Gt, arg(0), arg(1)),
        Function::Smaller => apply_binary(BinaryOp::Lt, arg(0), arg(1)),
        Function::Equal => apply_binary(BinaryOp::Eq, arg(0), arg(1)),
        Function::LargerEq => apply_binary(BinaryOp::Ge, arg(0), arg(1)),
        Function::SmallerEq => apply_binary(BinaryOp::Le, arg(0), arg(1)),
        Function::And => apply_binary(BinaryOp::And, arg(0), arg(1)),
        Function::Or => apply_binary(BinaryOp::Or, arg(0), arg(1)),
        Function::Not => Ok(bool_to_decimal(!truthy(arg(0)))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_expression;
    use super::*;
    use std::str::FromStr;

    fn eval(src: &str) -> FormulaResult<Decimal> {
        eval_with(src, &ResolvedVariables::new())
    }

    fn eval_with(src: &str, vars: &ResolvedVariables) -> FormulaResult<Decimal> {
        eval_expr(&parse_expression(src)?, vars)
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_arithmetic_precision() {
        // 十进制运算不产生二进制浮点误差
        assert_eq!(eval("0.1 + 0.2").unwrap(), d("0.3"));
        assert_eq!(eval("10 / 4").unwrap(), d("2.5"));
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power() {
        assert_eq!(eval("-2 ^ 2").unwrap(), d("-4"));
        assert_eq!(eval("2 ^ -1").unwrap(), d("0.5"));
    }

    #[test]
    fn test_modulo_follows_divisor_sign() {
        assert_eq!(eval("7 % 3").unwrap(), d("1"));
        assert_eq!(eval("-7 % 3").unwrap(), d("2"));
        assert_eq!(eval("mod(7, -3)").unwrap(), d("-2"));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(eval("1 / 0"), Err(FormulaError::Arithmetic(_))));
        assert!(matches!(eval("mod(1, 0)"), Err(FormulaError::Arithmetic(_))));
    }

    #[test]
    fn test_domain_errors() {
        assert!(matches!(eval("sqrt(-4)"), Err(FormulaError::Arithmetic(_))));
        assert!(matches!(eval("log(0)"), Err(FormulaError::Arithmetic(_))));
        assert!(matches!(eval("(-8) ^ 0.5"), Err(FormulaError::Arithmetic(_))));
    }

    #[test]
    fn test_exp_underflows_to_zero() {
        assert_eq!(eval("exp(-1000)").unwrap(), Decimal::ZERO);
        assert_eq!(eval("exp(-67)").unwrap(), Decimal::ZERO);
        assert!(eval("exp(-10)").unwrap() > Decimal::ZERO);
        assert!(matches!(eval("exp(1000)"), Err(FormulaError::Arithmetic(_))));
    }

    #[test]
    fn test_whitelisted_functions() {
        assert_eq!(eval("sqrt(16)").unwrap(), d("4"));
        assert_eq!(eval("abs(-3.5)").unwrap(), d("3.5"));
        assert_eq!(eval("round(2.5)").unwrap(), d("3"));
        assert_eq!(eval("round(-2.5)").unwrap(), d("-3"));
        assert_eq!(eval("round(3.14159, 2)").unwrap(), d("3.14"));
        assert_eq!(eval("floor(2.7)").unwrap(), d("2"));
        assert_eq!(eval("ceil(2.1)").unwrap(), d("3"));
        assert_eq!(eval("min(3, 1, 2)").unwrap(), d("1"));
        assert_eq!(eval("max(3, 1, 2)").unwrap(), d("3"));
        assert_eq!(eval("sum(1, 2, 3, 4)").unwrap(), d("10"));
        assert_eq!(eval("mean(1, 2, 3, 4)").unwrap(), d("2.5"));
        assert_eq!(eval("median(5, 1, 3)").unwrap(), d("3"));
        assert_eq!(eval("median(4, 1, 3, 2)").unwrap(), d("2.5"));
        assert_eq!(eval("add(1, 2, 3)").unwrap(), d("6"));
        assert_eq!(eval("multiply(2, 3, 4)").unwrap(), d("24"));
        assert_eq!(eval("subtract(10, 4)").unwrap(), d("6"));
        assert_eq!(eval("divide(9, 3)").unwrap(), d("3"));
        assert_eq!(eval("pow(2, 10)").unwrap(), d("1024"));
        assert_eq!(eval("exp(0)").unwrap(), d("1"));
        assert_eq!(eval("log10(1000)").unwrap().round_dp(10), d("3"));
        assert_eq!(eval("log(8, 2)").unwrap().round_dp(10), d("3"));
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval("3 > 2").unwrap(), Decimal::ONE);
        assert_eq!(eval("3 < 2").unwrap(), Decimal::ZERO);
        assert_eq!(eval("larger(3, 2)").unwrap(), Decimal::ONE);
        assert_eq!(eval("smallerEq(2, 2)").unwrap(), Decimal::ONE);
        assert_eq!(eval("equal(2, 2.0)").unwrap(), Decimal::ONE);
        assert_eq!(eval("1 and 0").unwrap(), Decimal::ZERO);
        assert_eq!(eval("1 or 0").unwrap(), Decimal::ONE);
        assert_eq!(eval("not 0").unwrap(), Decimal::ONE);
        assert_eq!(eval("!(2 > 1) || true").unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_variables() {
        let mut vars = ResolvedVariables::new();
        vars.insert("volume".to_string(), d("2.5"));
        vars.insert("quantity".to_string(), d("100"));
        assert_eq!(eval_with("volume * quantity", &vars).unwrap(), d("250"));
        assert!(matches!(
            eval_with("volume * missing", &vars),
            Err(FormulaError::UndefinedVariable(name)) if name == "missing"
        ));
    }
}
