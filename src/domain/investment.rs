// ==========================================
// 商业案例计算引擎 - 附加投资
// ==========================================
// 一次性投资计入总投资；周期性投资计入年度运营成本
// ==========================================

use crate::domain::types::{InvestmentCategory, InvestmentType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub id: String,
    pub business_case_id: String,
    pub concept: String,
    pub amount: f64,
    pub investment_type: InvestmentType,
    pub category: InvestmentCategory,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvestment {
    pub concept: String,
    pub amount: f64,
    pub investment_type: InvestmentType,
    #[serde(default)]
    pub category: InvestmentCategory,
    pub notes: Option<String>,
}

/// 投资更新（None 表示保持原值）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestmentPatch {
    pub concept: Option<String>,
    pub amount: Option<f64>,
    pub investment_type: Option<InvestmentType>,
    pub category: Option<InvestmentCategory>,
    pub notes: Option<String>,
}

/// 按投资类型汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestmentTotals {
    pub one_time: f64,
    pub recurring_monthly: f64,
    pub recurring_annual: f64,
}

impl InvestmentTotals {
    pub fn from_investments(items: &[Investment]) -> Self {
        let mut totals = Self::default();
        for item in items {
            totals.add(item.investment_type, item.amount);
        }
        totals
    }

    pub fn add(&mut self, investment_type: InvestmentType, amount: f64) {
        match investment_type {
            InvestmentType::OneTime => self.one_time += amount,
            InvestmentType::RecurringMonthly => self.recurring_monthly += amount,
            InvestmentType::RecurringAnnual => self.recurring_annual += amount,
        }
    }

    /// 周期性投资折算的年度成本
    pub fn annualized_recurring(&self) -> f64 {
        self.recurring_monthly * 12.0 + self.recurring_annual
    }
}
