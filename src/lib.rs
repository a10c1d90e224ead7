// ==========================================
// 商业案例计算引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 设备借用/销售商业案例的 ROI 计算与审批流转
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 公式、计算、校验、编排
pub mod engine;

// 配置层 - 引擎阈值
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    CalculationKind, CalculationMode, FindingSeverity, PurchaseType, RiskLevel, Stage,
    UtilizationStatus,
};

// 领域实体
pub use domain::{
    BcDetermination, BusinessCase, BusinessCaseCalculation, CalculationSnapshot, Investment,
    NewBusinessCase, OperationalData, ValidationFinding, WorkflowHistoryEntry,
};

// 引擎
pub use engine::{
    BusinessCaseCalculator, BusinessCaseOrchestrator, EngineError, EngineResult, ErrorKind,
    FormulaEvaluator, ValidationEngine,
};

// API
pub use api::{ApiError, ApiResult, BusinessCaseApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "商业案例灵活计算引擎";
