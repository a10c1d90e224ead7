// ==========================================
// 工作流编排器 - 次级重算触发
// ==========================================
// 测定项/投资/设备编辑后的重算: 失败只记录 warn，不影响编辑本身
// ==========================================

use super::core::BusinessCaseOrchestrator;
use crate::domain::calculation::BusinessCaseCalculation;
use crate::engine::calculator::BusinessCaseCalculator;
use crate::engine::error::EngineResult;
use std::sync::atomic::AtomicBool;
use tracing::{debug, warn};

impl BusinessCaseOrchestrator {
    /// 次级重算（独立事务，失败吞掉）
    ///
    /// # 参数
    /// - `bc_id`: 案例
    /// - `trigger`: 触发来源（用于日志）
    ///
    /// # 返回
    /// - Some: 重算成功
    /// - None: 重算失败（已记录日志）
    pub fn trigger_recalculation(
        &self,
        bc_id: &str,
        trigger: &str,
    ) -> Option<BusinessCaseCalculation> {
        best_effort(bc_id, trigger, || {
            self.in_transaction(|conn, config| {
                BusinessCaseCalculator::calculate_business_case_tx(
                    conn,
                    config,
                    bc_id,
                    &AtomicBool::new(false),
                )
            })
        })
    }
}

/// 执行并吞掉错误
pub(crate) fn best_effort<T>(
    bc_id: &str,
    trigger: &str,
    f: impl FnOnce() -> EngineResult<T>,
) -> Option<T> {
    match f() {
        Ok(value) => {
            debug!(bc_id = bc_id, trigger = trigger, "次级重算完成");
            Some(value)
        }
        Err(e) => {
            warn!(
                bc_id = bc_id,
                trigger = trigger,
                error = %e,
                kind = ?e.kind(),
                "次级重算失败，已忽略"
            );
            None
        }
    }
}
