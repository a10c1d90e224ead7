// ==========================================
// 商业案例计算引擎 - 工作流编排器
// ==========================================
// 主流程:
// 1. create_economic_bc          -> draft
// 2. calculate_initial_roi       -> 写回 ROI，不变更阶段
// 3. evaluate_economic_approval  -> pending_operational_data | rejected
// 4. attach_operational_data / attach_lis_data
// 5. recalculate_with_operational_data
//    -> 产能调整 -> 主例程 -> 一致性校验
//    -> pending_technical_review（有错误）| pending_manager_approval
// ==========================================

use super::capacity_adjust::plan_capacity_adjustments;
use super::transitions::{create_business_case_tx, promote_stage_tx};
use super::types::{ApprovalDecision, RecalculationOutcome};
use crate::config::{EngineConfig, EngineConfigReader};
use crate::domain::business_case::{BusinessCase, NewBusinessCase};
use crate::domain::calculation::BusinessCaseCalculation;
use crate::domain::determination::{DeterminationAdjustment, Quantities};
use crate::domain::operational::{LisData, OperationalData};
use crate::domain::types::Stage;
use crate::domain::workflow::WorkflowHistoryEntry;
use crate::engine::calculator::BusinessCaseCalculator;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::validation::ValidationEngine;
use crate::repository::error::RepositoryError;
use crate::repository::{
    BcDeterminationRepository, BusinessCaseRepository, CompletionFlag, OperationalDataRepository,
    WorkflowHistoryRepository,
};
use rusqlite::Connection;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

// ==========================================
// BusinessCaseOrchestrator - 工作流编排器
// ==========================================
pub struct BusinessCaseOrchestrator {
    conn: Arc<Mutex<Connection>>,
    config: Arc<dyn EngineConfigReader>,
}

impl BusinessCaseOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// - `conn`: 共享数据库连接
    /// - `config`: 引擎配置读取器
    pub fn new(conn: Arc<Mutex<Connection>>, config: Arc<dyn EngineConfigReader>) -> Self {
        Self { conn, config }
    }

    /// 在单个事务内执行（失败回滚）
    ///
    /// 配置快照在获取连接锁之前读取
    pub(crate) fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Connection, &EngineConfig) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let config = EngineConfig::load(self.config.as_ref())?;
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction()?;
        let value = f(&tx, &config)?;
        tx.commit()?;
        Ok(value)
    }

    // ==========================================
    // 创建与经济阶段
    // ==========================================

    /// 创建经济案例
    ///
    /// # 返回
    /// - Err(InvalidInput): 入参不合法
    /// - Err(NotFound): 指定的设备不存在
    #[instrument(skip(self, input), fields(client = %input.client_name))]
    pub fn create_economic_bc(&self, input: &NewBusinessCase) -> EngineResult<BusinessCase> {
        self.in_transaction(|conn, _| create_business_case_tx(conn, input))
    }

    /// 初始 ROI 计算: 主例程 + 写回经济指标 + economic_data_complete
    #[instrument(skip(self))]
    pub fn calculate_initial_roi(&self, bc_id: &str) -> EngineResult<BusinessCaseCalculation> {
        self.in_transaction(|conn, config| Self::calculate_and_persist_tx(conn, config, bc_id))
    }

    /// 经济审批: ROI >= 目标 -> pending_operational_data，否则 rejected
    ///
    /// # 返回
    /// - Err(MissingCalculation): 尚未计算 ROI
    #[instrument(skip(self))]
    pub fn evaluate_economic_approval(
        &self,
        bc_id: &str,
        user: &str,
    ) -> EngineResult<ApprovalDecision> {
        self.in_transaction(|conn, _| {
            let bc = BusinessCaseRepository::get_tx(conn, bc_id)?;
            let roi = bc
                .calculated_roi_percentage
                .ok_or_else(|| EngineError::MissingCalculation(bc_id.to_string()))?;
            let target = bc.target_margin_percentage;

            let (approved, new_stage, notes) = if roi >= target {
                (
                    true,
                    Stage::PendingOperationalData,
                    format!("经济审批通过: ROI {}% >= 目标 {}%", roi, target),
                )
            } else {
                (
                    false,
                    Stage::Rejected,
                    format!("经济审批未通过: ROI {}% < 目标 {}%", roi, target),
                )
            };
            promote_stage_tx(conn, bc_id, new_stage, user, Some(&notes))?;

            Ok(ApprovalDecision {
                approved,
                roi_percentage: roi,
                target_margin_percentage: target,
                new_stage,
            })
        })
    }

    // ==========================================
    // 运营阶段
    // ==========================================

    /// 写入运营数据（不变更阶段）
    #[instrument(skip(self, data))]
    pub fn attach_operational_data(&self, bc_id: &str, data: &OperationalData) -> EngineResult<()> {
        data.check()
            .map_err(|(field, message)| EngineError::invalid_input(field, message))?;
        self.in_transaction(|conn, _| {
            BusinessCaseRepository::get_tx(conn, bc_id)?;
            OperationalDataRepository::upsert_operational_tx(conn, bc_id, data)?;
            BusinessCaseRepository::set_flag_tx(conn, bc_id, CompletionFlag::OperationalData, true)?;
            info!(bc_id = bc_id, "运营数据已写入");
            Ok(())
        })
    }

    /// 写入 LIS 数据（不变更阶段）
    #[instrument(skip(self, data))]
    pub fn attach_lis_data(&self, bc_id: &str, data: &LisData) -> EngineResult<()> {
        self.in_transaction(|conn, _| {
            BusinessCaseRepository::get_tx(conn, bc_id)?;
            OperationalDataRepository::upsert_lis_tx(conn, bc_id, data)?;
            BusinessCaseRepository::set_flag_tx(conn, bc_id, CompletionFlag::LisData, true)?;
            info!(bc_id = bc_id, "LIS 数据已写入");
            Ok(())
        })
    }

    /// 按运营产能截断测定项数量（独立事务）
    pub fn adjust_determinations_to_reality(
        &self,
        bc_id: &str,
        operational: &OperationalData,
    ) -> EngineResult<Vec<DeterminationAdjustment>> {
        self.in_transaction(|conn, config| {
            Self::adjust_determinations_to_reality_tx(conn, config, bc_id, operational)
        })
    }

    pub fn adjust_determinations_to_reality_tx(
        conn: &Connection,
        config: &EngineConfig,
        bc_id: &str,
        operational: &OperationalData,
    ) -> EngineResult<Vec<DeterminationAdjustment>> {
        let determinations = BcDeterminationRepository::list_by_case_tx(conn, bc_id)?;
        let adjustments =
            plan_capacity_adjustments(&determinations, operational, config.assumed_tests_per_hour);

        for adj in &adjustments {
            BcDeterminationRepository::update_quantities_tx(
                conn,
                bc_id,
                &adj.determination_id,
                Quantities {
                    monthly: adj.adjusted_monthly_quantity,
                    annual: adj.adjusted_annual_quantity,
                },
                &adj.note,
            )?;
            info!(
                bc_id = bc_id,
                determination_id = %adj.determination_id,
                previous = adj.previous_annual_quantity,
                adjusted = adj.adjusted_annual_quantity,
                "测定项数量按运营产能调整"
            );
        }
        Ok(adjustments)
    }

    /// 运营数据重算（单事务）
    ///
    /// # 返回
    /// - Err(MissingPrerequisite): 当前阶段不接受重算（draft / rejected）
    /// - Err(MissingOperationalData): 尚未写入运营数据
    #[instrument(skip(self))]
    pub fn recalculate_with_operational_data(
        &self,
        bc_id: &str,
        user: &str,
    ) -> EngineResult<RecalculationOutcome> {
        self.in_transaction(|conn, config| {
            let bc = BusinessCaseRepository::get_tx(conn, bc_id)?;
            if !bc.stage.accepts_recalculation() {
                return Err(EngineError::missing_prerequisite(
                    bc_id,
                    format!("当前阶段不允许运营数据重算: {}", bc.stage),
                ));
            }
            let operational = OperationalDataRepository::find_operational_tx(conn, bc_id)?
                .ok_or_else(|| EngineError::MissingOperationalData(bc_id.to_string()))?;

            let adjustments =
                Self::adjust_determinations_to_reality_tx(conn, config, bc_id, &operational)?;
            let calculation = Self::calculate_and_persist_tx(conn, config, bc_id)?;
            let validation = ValidationEngine::validate_coherence_tx(conn, config, bc_id)?;

            let (new_stage, notes) = if validation.has_errors {
                (
                    Stage::PendingTechnicalReview,
                    "运营数据重算发现错误，转技术复核",
                )
            } else if validation.has_warnings {
                (
                    Stage::PendingManagerApproval,
                    "运营数据重算完成（存在警告），待经理审批",
                )
            } else {
                (Stage::PendingManagerApproval, "运营数据重算完成，待经理审批")
            };
            promote_stage_tx(conn, bc_id, new_stage, user, Some(notes))?;

            Ok(RecalculationOutcome {
                adjustments,
                calculation,
                validation,
                new_stage,
            })
        })
    }

    // ==========================================
    // 阶段与历史
    // ==========================================

    /// 手动推进阶段
    ///
    /// # 返回
    /// - Err(InvalidStateTransition): 不允许的迁移
    #[instrument(skip(self, notes))]
    pub fn promote_stage(
        &self,
        bc_id: &str,
        new_stage: Stage,
        user: &str,
        notes: Option<&str>,
    ) -> EngineResult<BusinessCase> {
        self.in_transaction(|conn, _| promote_stage_tx(conn, bc_id, new_stage, user, notes))
    }

    /// 工作流历史（按时间顺序）
    pub fn history(&self, bc_id: &str) -> EngineResult<Vec<WorkflowHistoryEntry>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        BusinessCaseRepository::get_tx(&conn, bc_id)?;
        Ok(WorkflowHistoryRepository::list_by_case_tx(&conn, bc_id)?)
    }

    // ==========================================
    // 内部
    // ==========================================

    /// 主例程 + 写回主档经济指标
    pub(crate) fn calculate_and_persist_tx(
        conn: &Connection,
        config: &EngineConfig,
        bc_id: &str,
    ) -> EngineResult<BusinessCaseCalculation> {
        let calculation = BusinessCaseCalculator::calculate_business_case_tx(
            conn,
            config,
            bc_id,
            &AtomicBool::new(false),
        )?;
        BusinessCaseRepository::update_computed_economics_tx(
            conn,
            bc_id,
            &calculation.snapshot.rentability.to_economics(),
        )?;
        BusinessCaseRepository::set_flag_tx(conn, bc_id, CompletionFlag::EconomicData, true)?;
        Ok(calculation)
    }
}
