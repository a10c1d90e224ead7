// ==========================================
// 商业案例计算引擎 - 配置层
// ==========================================
// 职责: 引擎阈值配置管理（代码默认值 + config_kv 覆写）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod engine_config;
pub mod engine_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use engine_config::EngineConfig;
pub use engine_config_trait::EngineConfigReader;
