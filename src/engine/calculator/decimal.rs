// ==========================================
// 案例计算器 - 十进制换算
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// f64 -> Decimal（NaN/无穷视为非法输入）
pub(crate) fn to_decimal(field: &str, value: f64) -> EngineResult<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| EngineError::invalid_input(field, format!("无法转换为十进制: {}", value)))
}

/// 金额取两位小数（四舍五入，远离零）
pub(crate) fn round_money(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// 不取整直接转 f64
pub(crate) fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// 带溢出检查的十进制运算，溢出时报告案例与计算步骤
pub(crate) struct CheckedMath<'a> {
    bc_id: &'a str,
}

impl<'a> CheckedMath<'a> {
    pub(crate) fn new(bc_id: &'a str) -> Self {
        Self { bc_id }
    }

    fn check(&self, step: &str, value: Option<Decimal>) -> EngineResult<Decimal> {
        value.ok_or_else(|| EngineError::overflow(self.bc_id, step))
    }

    pub(crate) fn add(&self, step: &str, a: Decimal, b: Decimal) -> EngineResult<Decimal> {
        self.check(step, a.checked_add(b))
    }

    pub(crate) fn sub(&self, step: &str, a: Decimal, b: Decimal) -> EngineResult<Decimal> {
        self.check(step, a.checked_sub(b))
    }

    pub(crate) fn mul(&self, step: &str, a: Decimal, b: Decimal) -> EngineResult<Decimal> {
        self.check(step, a.checked_mul(b))
    }

    pub(crate) fn div(&self, step: &str, a: Decimal, b: Decimal) -> EngineResult<Decimal> {
        self.check(step, a.checked_div(b))
    }

    pub(crate) fn sum(
        &self,
        step: &str,
        values: impl IntoIterator<Item = Decimal>,
    ) -> EngineResult<Decimal> {
        values
            .into_iter()
            .try_fold(Decimal::ZERO, |acc, v| self.add(step, acc, v))
    }

    /// i64 测试量求和
    pub(crate) fn sum_tests(
        &self,
        step: &str,
        values: impl IntoIterator<Item = i64>,
    ) -> EngineResult<Decimal> {
        values
            .into_iter()
            .try_fold(0_i64, |acc, v| acc.checked_add(v))
            .map(Decimal::from)
            .ok_or_else(|| EngineError::overflow(self.bc_id, step))
    }
}
