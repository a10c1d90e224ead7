// ==========================================
// 商业案例计算引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::BusinessCaseApi;
use crate::config::config_manager::ConfigManager;
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::{BusinessCaseCalculator, BusinessCaseOrchestrator, ValidationEngine};
use crate::repository::{
    BcDeterminationRepository, BusinessCaseRepository, CalculationRepository,
    CalculationTemplateRepository, InvestmentRepository, ValidationRepository,
};

/// 应用状态
///
/// 所有组件共享同一个数据库连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 案例计算器（单独试算设备利用率/回报时使用）
    pub calculator: Arc<BusinessCaseCalculator>,

    /// 一致性校验引擎
    pub validation_engine: Arc<ValidationEngine>,

    /// 工作流编排器
    pub orchestrator: Arc<BusinessCaseOrchestrator>,

    /// 商业案例API
    pub business_case_api: Arc<BusinessCaseApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    ///
    /// # 说明
    /// 1. 打开连接并建表（幂等）
    /// 2. 初始化Repository与Engine
    /// 3. 创建API实例
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置层
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // Repository层
        // ==========================================
        let business_case_repo = Arc::new(BusinessCaseRepository::new(conn.clone()));
        let determination_repo = Arc::new(BcDeterminationRepository::new(conn.clone()));
        let investment_repo = Arc::new(InvestmentRepository::new(conn.clone()));
        let calculation_repo = Arc::new(CalculationRepository::new(conn.clone()));
        let validation_repo = Arc::new(ValidationRepository::new(conn.clone()));
        let template_repo = Arc::new(CalculationTemplateRepository::new(conn.clone()));

        // ==========================================
        // Engine层
        // ==========================================
        let calculator = Arc::new(BusinessCaseCalculator::new(
            conn.clone(),
            config_manager.clone(),
        ));
        let validation_engine = Arc::new(ValidationEngine::new(
            conn.clone(),
            config_manager.clone(),
        ));
        let orchestrator = Arc::new(BusinessCaseOrchestrator::new(
            conn.clone(),
            config_manager.clone(),
        ));

        // ==========================================
        // API层
        // ==========================================
        let business_case_api = Arc::new(BusinessCaseApi::new(
            orchestrator.clone(),
            business_case_repo,
            determination_repo,
            investment_repo,
            calculation_repo,
            validation_repo,
            template_repo,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            config_manager,
            calculator,
            validation_engine,
            orchestrator,
            business_case_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 BC_ENGINE_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("BC_ENGINE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./business_case_engine.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        let dir = data_dir.join("business-case-engine-dev");

        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("business-case-engine");

        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("business_case_engine.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_app_state_initializes_schema() {
        let file = NamedTempFile::new().unwrap();
        let db_path = file.path().to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).unwrap();
        assert_eq!(state.db_path, db_path);
        assert!(state.business_case_api.list_templates(None).unwrap().is_empty());
    }
}
