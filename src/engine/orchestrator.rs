// ==========================================
// 商业案例计算引擎 - 工作流编排器
// ==========================================
// 状态机:
//   draft -> pending_operational_data -> {pending_technical_review | pending_manager_approval}
//   draft -> rejected
// 红线: 每个主迁移单事务，失败整体回滚并向上传播
// 红线: 次级重算触发（测定项/投资/设备编辑后）只记录日志，不向上传播
// ==========================================
// 职责: 创建案例 / 初始 ROI / 经济审批 / 运营数据重算 / 阶段推进 / 历史
// ==========================================

mod capacity_adjust;
mod core;
mod transitions;
mod triggers;
mod types;

#[cfg(test)]
mod tests;

pub use self::core::BusinessCaseOrchestrator;
pub use capacity_adjust::plan_capacity_adjustments;
pub use types::{ApprovalDecision, RecalculationOutcome};
