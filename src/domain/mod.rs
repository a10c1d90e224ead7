// ==========================================
// 商业案例计算引擎 - 领域层
// ==========================================
// 职责: 实体与值类型，不含持久化与业务编排
// ==========================================

pub mod business_case;
pub mod calculation;
pub mod determination;
pub mod investment;
pub mod operational;
pub mod types;
pub mod validation;
pub mod workflow;

pub use business_case::{
    BusinessCase, ComputedEconomics, EconomicData, EquipmentSelection, NewBusinessCase,
};
pub use calculation::{
    BusinessCaseCalculation, CalculationDetails, CalculationSnapshot, CalculationTemplate,
    CalculationTotals, CalculationWarning, DeterminationCalculation, DeterminationLineResult,
    FormulaOrigin, Recommendation, RentabilityReport, UtilizationReport,
};
pub use determination::{
    normalize_quantities, BcDetermination, CatalogDetermination, DeterminationAdjustment,
    Equipment, Quantities,
};
pub use investment::{Investment, InvestmentPatch, InvestmentTotals, NewInvestment};
pub use operational::{LisData, LisEquipmentInterface, OperationalData};
pub use types::{
    AdvisorySeverity, CalculationKind, CalculationMode, FindingSeverity, InvestmentCategory,
    InvestmentType, PurchaseType, RiskLevel, Stage, UtilizationStatus,
};
pub use validation::{ValidationFinding, ValidationOutcome};
pub use workflow::{NewWorkflowHistoryEntry, WorkflowHistoryEntry};
