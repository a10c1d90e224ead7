// ==========================================
// 商业案例计算引擎 - 案例计算器
// ==========================================
// 职责: 单测定项消耗/成本、设备利用率、借用回报、整案计算
// 输入: 案例主档 + 经济数据 + 主设备 + 测定项 + 附加投资
// 输出: 逐行结果 + 计算快照（calculation_version 严格递增）
// ==========================================
// 并发: 变量解析顺序执行（可能查表），公式求值在作用域线程中扇出
// 金额: 十进制运算，边界处保留两位小数
// ==========================================

mod advisories;
mod core;
mod decimal;
mod determination;
mod fanout;
mod rentability;
mod totals;
mod utilization;


pub use self::core::BusinessCaseCalculator;
pub use advisories::{build_recommendations, build_warnings};
pub use rentability::compute_rentability;
pub use totals::{compute_totals, LineAmounts};
pub use utilization::compute_utilization;
