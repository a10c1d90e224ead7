// ==========================================
// 商业案例计算引擎 - 测定项与设备
// ==========================================
// 职责: 目录测定项 / 设备参考数据 / 案例测定项行
// 红线: 月量与年量互相可推导，二者同时持久化
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// CatalogDetermination - 目录测定项（参考数据，只读）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDetermination {
    pub id: String,
    pub name: String,
    pub volume_per_test: Option<f64>,
    pub reagent_consumption: Option<f64>,
    pub processing_time: Option<f64>,
    pub wash_cycles: Option<f64>,
    pub blank_required: bool,
    pub calibration_frequency: Option<f64>,
    pub cost_per_test: Option<f64>,
    /// 计算类别 -> 公式 JSON
    pub calculation_formula: Option<serde_json::Value>,
}

// ==========================================
// Equipment - 设备（参考数据，只读）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    pub name: String,
    pub capacity_per_hour: Option<f64>,
    pub max_daily_capacity: Option<f64>,
    pub base_price: Option<f64>,
    /// 计算类别 -> 公式 JSON
    pub default_calculation_formula: Option<serde_json::Value>,
}

// ==========================================
// BcDetermination - 案例测定项
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BcDetermination {
    pub id: String,
    pub business_case_id: String,
    pub determination_id: String,
    pub monthly_quantity: i64,
    pub annual_quantity: i64,
    pub calculated_consumption: Option<f64>,
    pub calculated_cost: Option<f64>,
    pub calculation_details: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// 归一化后的数量对
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantities {
    pub monthly: i64,
    pub annual: i64,
}

/// 单个测定项允许的最大测试量（月量或年量）
pub const MAX_QUANTITY: i64 = 1_000_000_000_000;

/// 归一化月量/年量
///
/// 规则：
/// - 月量 = 给定月量，否则 ceil(年量/12)，否则 0
/// - 年量 = 给定年量，否则 月量×12
///
/// # 返回
/// - None: 月量×12 溢出 i64
pub fn normalize_quantities(monthly: Option<i64>, annual: Option<i64>) -> Option<Quantities> {
    let monthly = match (monthly, annual) {
        (Some(m), _) => m,
        (None, Some(a)) => ceil_div(a, 12),
        (None, None) => 0,
    };
    let annual = match annual {
        Some(a) => a,
        None => monthly.checked_mul(12)?,
    };
    Some(Quantities { monthly, annual })
}

/// 整数向上取整除法（仅用于非负数量）
pub fn ceil_div(value: i64, divisor: i64) -> i64 {
    if divisor == 0 {
        return 0;
    }
    let quotient = value.div_euclid(divisor);
    if value.rem_euclid(divisor) == 0 {
        quotient
    } else {
        quotient + 1
    }
}

// ==========================================
// DeterminationAdjustment - 产能约束调整记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterminationAdjustment {
    pub determination_id: String,
    pub previous_annual_quantity: i64,
    pub adjusted_annual_quantity: i64,
    pub adjusted_monthly_quantity: i64,
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_from_monthly() {
        let q = normalize_quantities(Some(100), None).unwrap();
        assert_eq!(q, Quantities { monthly: 100, annual: 1200 });
    }

    #[test]
    fn test_normalize_from_annual_rounds_up() {
        let q = normalize_quantities(None, Some(1201)).unwrap();
        assert_eq!(q, Quantities { monthly: 101, annual: 1201 });

        let q = normalize_quantities(None, Some(24000)).unwrap();
        assert_eq!(q, Quantities { monthly: 2000, annual: 24000 });
    }

    #[test]
    fn test_normalize_both_given_keeps_both() {
        let q = normalize_quantities(Some(10), Some(500)).unwrap();
        assert_eq!(q, Quantities { monthly: 10, annual: 500 });
    }

    #[test]
    fn test_normalize_nothing_given() {
        let q = normalize_quantities(None, None).unwrap();
        assert_eq!(q, Quantities { monthly: 0, annual: 0 });
    }

    #[test]
    fn test_quantity_duality() {
        for m in [0_i64, 1, 7, 250, 3333] {
            let q = normalize_quantities(Some(m), None).unwrap();
            assert_eq!(q.annual, m * 12);
            let back = normalize_quantities(None, Some(q.annual)).unwrap();
            assert_eq!(back.monthly, m);
        }
    }

    #[test]
    fn test_normalize_rejects_monthly_overflow() {
        assert_eq!(normalize_quantities(Some(i64::MAX / 10), None), None);
    }

    #[test]
    fn test_ceil_div_at_i64_max() {
        let q = normalize_quantities(None, Some(i64::MAX)).unwrap();
        assert_eq!(q.monthly, i64::MAX / 12 + 1);
        assert_eq!(ceil_div(i64::MAX, 1), i64::MAX);
    }
}
