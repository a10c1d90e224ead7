// ==========================================
// 商业案例计算引擎 - 命令行入口
// ==========================================
// 用法:
//   business-case-engine                                  初始化数据库
//   business-case-engine validate-formula <公式.json> [上下文.json]
//   business-case-engine calculate <bc_id>
// 数据库路径: BC_ENGINE_DB_PATH 或用户数据目录
// ==========================================

use anyhow::{bail, Context};
use business_case_engine::app::{get_default_db_path, AppState};
use business_case_engine::engine::formula::FormulaContext;
use business_case_engine::logging;

fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", business_case_engine::APP_NAME);
    tracing::info!("系统版本: {}", business_case_engine::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(anyhow::Error::msg)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => {
            println!("数据库已就绪: {}", state.db_path);
        }
        Some("validate-formula") => {
            let formula_path = args.get(1).context("缺少公式文件参数")?;
            let formula: serde_json::Value = read_json(formula_path)?;
            let context: FormulaContext = match args.get(2) {
                Some(path) => read_json(path)?,
                None => FormulaContext::new(),
            };

            let validation = state
                .business_case_api
                .validate_formula(&formula, &context)?;
            println!("{}", serde_json::to_string_pretty(&validation)?);
        }
        Some("calculate") => {
            let bc_id = args.get(1).context("缺少案例ID参数")?;
            let calculation = state
                .calculator
                .calculate_business_case(bc_id)
                .with_context(|| format!("案例计算失败: {}", bc_id))?;
            println!("{}", serde_json::to_string_pretty(&calculation.snapshot)?);
        }
        Some(other) => bail!("未知命令: {}", other),
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("无法读取文件: {}", path))?;
    serde_json::from_str(&text).with_context(|| format!("JSON 格式错误: {}", path))
}
