// ==========================================
// 商业案例计算引擎 - 领域类型定义
// ==========================================
// 职责: 阶段/风险/计算模式/投资类型等枚举
// 序列化格式: snake_case (与数据库存储一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 工作流阶段 (Stage)
// ==========================================
// 状态机:
//   draft -> pending_operational_data -> {pending_technical_review | pending_manager_approval}
//   draft -> rejected
// 重算可在 pending_technical_review 与 pending_manager_approval 之间往返
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Draft,
    PendingOperationalData,
    PendingTechnicalReview,
    PendingManagerApproval,
    Rejected,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Draft => "draft",
            Stage::PendingOperationalData => "pending_operational_data",
            Stage::PendingTechnicalReview => "pending_technical_review",
            Stage::PendingManagerApproval => "pending_manager_approval",
            Stage::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Stage::Draft),
            "pending_operational_data" => Some(Stage::PendingOperationalData),
            "pending_technical_review" => Some(Stage::PendingTechnicalReview),
            "pending_manager_approval" => Some(Stage::PendingManagerApproval),
            "rejected" => Some(Stage::Rejected),
            _ => None,
        }
    }

    /// 是否允许从当前阶段迁移到目标阶段
    ///
    /// 重算允许在复核/审批阶段之间往返（含原地重入）；rejected 无出边。
    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Draft, PendingOperationalData)
                | (Draft, Rejected)
                | (PendingOperationalData, PendingTechnicalReview)
                | (PendingOperationalData, PendingManagerApproval)
                | (PendingTechnicalReview, PendingTechnicalReview)
                | (PendingTechnicalReview, PendingManagerApproval)
                | (PendingManagerApproval, PendingTechnicalReview)
                | (PendingManagerApproval, PendingManagerApproval)
        )
    }

    /// 是否允许执行运营数据重算
    pub fn accepts_recalculation(&self) -> bool {
        matches!(
            self,
            Stage::PendingOperationalData
                | Stage::PendingTechnicalReview
                | Stage::PendingManagerApproval
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 风险等级 (Risk Level)
// ==========================================
// 排序: Low < Medium < High（用于单调性判断）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 计算模式 (Calculation Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMode {
    Monthly,
    Annual,
}

impl CalculationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMode::Monthly => "monthly",
            CalculationMode::Annual => "annual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "monthly" => Some(CalculationMode::Monthly),
            "annual" => Some(CalculationMode::Annual),
            _ => None,
        }
    }
}

impl fmt::Display for CalculationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 采购类型 (Purchase Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseType {
    ComodatoPublico,
    ComodatoPrivado,
    VentaPrivada,
}

impl PurchaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseType::ComodatoPublico => "comodato_publico",
            PurchaseType::ComodatoPrivado => "comodato_privado",
            PurchaseType::VentaPrivada => "venta_privada",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "comodato_publico" => Some(PurchaseType::ComodatoPublico),
            "comodato_privado" => Some(PurchaseType::ComodatoPrivado),
            "venta_privada" => Some(PurchaseType::VentaPrivada),
            _ => None,
        }
    }

    /// 未显式指定计算模式时的默认模式：公立借用按月，其余按年
    pub fn default_calculation_mode(&self) -> CalculationMode {
        match self {
            PurchaseType::ComodatoPublico => CalculationMode::Monthly,
            _ => CalculationMode::Annual,
        }
    }
}

impl Default for PurchaseType {
    fn default() -> Self {
        PurchaseType::ComodatoPublico
    }
}

impl fmt::Display for PurchaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 计算类别 (Calculation Kind)
// ==========================================
// 公式按类别挂在测定项/设备的 JSON 映射下
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationKind {
    Consumption,
    Cost,
}

impl CalculationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationKind::Consumption => "consumption",
            CalculationKind::Cost => "cost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "consumption" => Some(CalculationKind::Consumption),
            "cost" => Some(CalculationKind::Cost),
            _ => None,
        }
    }
}

impl fmt::Display for CalculationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 设备利用率状态 (Utilization Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationStatus {
    Overload,
    Optimal,
    Underutilized,
}

impl UtilizationStatus {
    /// 按利用率百分比分档
    ///
    /// # 参数
    /// - `utilization_pct`: 利用率（百分比，未取整）
    /// - `overload_pct`: 过载阈值（严格大于）
    /// - `underutilized_pct`: 低利用阈值（严格小于）
    pub fn classify(utilization_pct: f64, overload_pct: f64, underutilized_pct: f64) -> Self {
        if utilization_pct > overload_pct {
            UtilizationStatus::Overload
        } else if utilization_pct < underutilized_pct {
            UtilizationStatus::Underutilized
        } else {
            UtilizationStatus::Optimal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UtilizationStatus::Overload => "overload",
            UtilizationStatus::Optimal => "optimal",
            UtilizationStatus::Underutilized => "underutilized",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "overload" => Some(UtilizationStatus::Overload),
            "optimal" => Some(UtilizationStatus::Optimal),
            "underutilized" => Some(UtilizationStatus::Underutilized),
            _ => None,
        }
    }
}

impl fmt::Display for UtilizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 校验发现严重度 (Finding Severity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Info,
    Warning,
    Error,
}

impl FindingSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingSeverity::Info => "info",
            FindingSeverity::Warning => "warning",
            FindingSeverity::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(FindingSeverity::Info),
            "warning" => Some(FindingSeverity::Warning),
            "error" => Some(FindingSeverity::Error),
            _ => None,
        }
    }
}

impl fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 计算提示严重度 (Advisory Severity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisorySeverity {
    Critical,
    Warning,
    Info,
}

impl fmt::Display for AdvisorySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvisorySeverity::Critical => write!(f, "critical"),
            AdvisorySeverity::Warning => write!(f, "warning"),
            AdvisorySeverity::Info => write!(f, "info"),
        }
    }
}

// ==========================================
// 投资类型 / 投资类别
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentType {
    OneTime,
    RecurringMonthly,
    RecurringAnnual,
}

impl InvestmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentType::OneTime => "one_time",
            InvestmentType::RecurringMonthly => "recurring_monthly",
            InvestmentType::RecurringAnnual => "recurring_annual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "one_time" => Some(InvestmentType::OneTime),
            "recurring_monthly" => Some(InvestmentType::RecurringMonthly),
            "recurring_annual" => Some(InvestmentType::RecurringAnnual),
            _ => None,
        }
    }
}

impl fmt::Display for InvestmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentCategory {
    Installation,
    Training,
    Transport,
    Maintenance,
    Other,
}

impl InvestmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentCategory::Installation => "installation",
            InvestmentCategory::Training => "training",
            InvestmentCategory::Transport => "transport",
            InvestmentCategory::Maintenance => "maintenance",
            InvestmentCategory::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "installation" => Some(InvestmentCategory::Installation),
            "training" => Some(InvestmentCategory::Training),
            "transport" => Some(InvestmentCategory::Transport),
            "maintenance" => Some(InvestmentCategory::Maintenance),
            "other" => Some(InvestmentCategory::Other),
            _ => None,
        }
    }
}

impl Default for InvestmentCategory {
    fn default() -> Self {
        InvestmentCategory::Other
    }
}

impl fmt::Display for InvestmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
