// ==========================================
// 商业案例计算引擎 - 一致性校验引擎
// ==========================================
// 规则:
// 1. 质控占比: 年质控测试量 / 年测试总量 > 上限 -> warning
// 2. 运营时长: 每周运营小时 < 下限 且 年测试量 > 高量阈值 -> warning
// 3. ROI: 已计算 ROI < 目标毛利率 -> error
// 红线: 每次校验先清空旧发现再写入（幂等）
// 风险: 有 error -> high；warning >= 2 -> medium；否则 low
// ==========================================

use crate::config::{EngineConfig, EngineConfigReader};
use crate::domain::business_case::BusinessCase;
use crate::domain::determination::BcDetermination;
use crate::domain::operational::OperationalData;
use crate::domain::types::FindingSeverity;
use crate::domain::validation::{finding_types, ValidationFinding, ValidationOutcome};
use crate::engine::error::EngineResult;
use crate::repository::error::RepositoryError;
use crate::repository::{
    BcDeterminationRepository, BusinessCaseRepository, OperationalDataRepository,
    ValidationRepository,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::info;

// ==========================================
// ValidationEngine - 一致性校验引擎
// ==========================================
pub struct ValidationEngine {
    conn: Arc<Mutex<Connection>>,
    config: Arc<dyn EngineConfigReader>,
}

impl ValidationEngine {
    pub fn new(conn: Arc<Mutex<Connection>>, config: Arc<dyn EngineConfigReader>) -> Self {
        Self { conn, config }
    }

    /// 校验案例一致性（独立事务）
    pub fn validate_coherence(&self, bc_id: &str) -> EngineResult<ValidationOutcome> {
        let config = EngineConfig::load(self.config.as_ref())?;
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction()?;
        let outcome = Self::validate_coherence_tx(&tx, &config, bc_id)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// 校验案例一致性（事务内）
    ///
    /// # 返回
    /// 本次校验的发现与风险等级；同时写回主档的 has_inconsistencies /
    /// inconsistency_details / risk_level
    pub fn validate_coherence_tx(
        conn: &Connection,
        config: &EngineConfig,
        bc_id: &str,
    ) -> EngineResult<ValidationOutcome> {
        let bc = BusinessCaseRepository::get_tx(conn, bc_id)?;
        let operational = OperationalDataRepository::find_operational_tx(conn, bc_id)?;
        let determinations = BcDeterminationRepository::list_by_case_tx(conn, bc_id)?;

        let findings = derive_findings(&bc, operational.as_ref(), &determinations, config);
        let outcome = ValidationOutcome::from_findings(findings);

        ValidationRepository::replace_findings_tx(conn, bc_id, &outcome.findings)?;
        let details = serde_json::to_value(&outcome.findings).map_err(RepositoryError::from)?;
        BusinessCaseRepository::update_validation_summary_tx(
            conn,
            bc_id,
            !outcome.findings.is_empty(),
            &details,
            outcome.risk_level,
        )?;

        info!(
            bc_id = bc_id,
            findings = outcome.findings.len(),
            risk_level = %outcome.risk_level,
            "一致性校验完成"
        );
        Ok(outcome)
    }
}

/// 推导校验发现（纯函数）
pub fn derive_findings(
    bc: &BusinessCase,
    operational: Option<&OperationalData>,
    determinations: &[BcDetermination],
    config: &EngineConfig,
) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();

    if let Some(op) = operational.filter(|_| !determinations.is_empty()) {
        let total_annual_tests: f64 = determinations
            .iter()
            .map(|d| d.annual_quantity as f64)
            .sum();

        // 无年测试量时跳过占比计算
        if total_annual_tests > 0.0 {
            let qc_pct = op.annual_qc_tests() / total_annual_tests * 100.0;
            if qc_pct > config.qc_overhead_max_pct {
                findings.push(ValidationFinding::new(
                    finding_types::COHERENCE,
                    FindingSeverity::Warning,
                    format!(
                        "质控测试占测试量的 {:.1}%（建议低于 {}%）",
                        qc_pct, config.qc_overhead_max_pct
                    ),
                ));
            }
        }

        let weekly_hours = op.weekly_operating_hours();
        if weekly_hours < config.min_weekly_operating_hours
            && total_annual_tests > config.high_volume_annual_tests
        {
            findings.push(ValidationFinding::new(
                finding_types::COHERENCE,
                FindingSeverity::Warning,
                format!(
                    "年测试量较高（{} 次/年）但每周运营时长不足（{} 小时/周）",
                    total_annual_tests, weekly_hours
                ),
            ));
        }
    }

    if let Some(roi) = bc.calculated_roi_percentage {
        if roi < bc.target_margin_percentage {
            findings.push(ValidationFinding::new(
                finding_types::ROI,
                FindingSeverity::Error,
                format!(
                    "ROI {}% 未达到目标 {}%",
                    roi, bc.target_margin_percentage
                ),
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{PurchaseType, RiskLevel, Stage};
    use crate::repository::current_timestamp;

    fn business_case(roi: Option<f64>) -> BusinessCase {
        let now = current_timestamp();
        BusinessCase {
            id: "bc-1".to_string(),
            client_id: None,
            client_name: "中心医院".to_string(),
            purchase_type: PurchaseType::ComodatoPublico,
            duration_years: 3,
            target_margin_percentage: 25.0,
            process_code: None,
            contract_object: None,
            stage: Stage::PendingOperationalData,
            created_by: "tester".to_string(),
            calculated_roi_percentage: roi,
            calculated_payback_months: None,
            monthly_margin: None,
            annual_margin: None,
            monthly_revenue: None,
            annual_revenue: None,
            monthly_cost: None,
            annual_cost: None,
            total_investment: None,
            equipment_investment: None,
            economic_data_complete: true,
            operational_data_complete: true,
            lis_data_complete: false,
            has_inconsistencies: false,
            inconsistency_details: None,
            risk_level: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(annual: i64) -> BcDetermination {
        let now = current_timestamp();
        BcDetermination {
            id: format!("line-{}", annual),
            business_case_id: "bc-1".to_string(),
            determination_id: format!("det-{}", annual),
            monthly_quantity: annual / 12,
            annual_quantity: annual,
            calculated_consumption: None,
            calculated_cost: None,
            calculation_details: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_qc_overhead_warning() {
        // 1 × 2 × 1 × 5 × 52 = 520 质控测试；520 / 2400 = 21.7%
        let op = OperationalData::default();
        let findings = derive_findings(
            &business_case(None),
            Some(&op),
            &[line(2400)],
            &EngineConfig::default(),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].finding_type, finding_types::COHERENCE);
        assert_eq!(findings[0].severity, FindingSeverity::Warning);
    }

    #[test]
    fn test_zero_annual_tests_skips_qc_check() {
        let op = OperationalData::default();
        let findings = derive_findings(
            &business_case(None),
            Some(&op),
            &[line(0)],
            &EngineConfig::default(),
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_low_hours_with_high_volume() {
        let op = OperationalData {
            work_days_per_week: 4,
            shifts_per_day: 1,
            hours_per_shift: 8.0,
            quality_controls_per_shift: 0,
            ..Default::default()
        };
        let findings = derive_findings(
            &business_case(None),
            Some(&op),
            &[line(60_000)],
            &EngineConfig::default(),
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("32"));
    }

    #[test]
    fn test_roi_below_target_is_error() {
        let findings = derive_findings(&business_case(Some(10.0)), None, &[], &EngineConfig::default());
        let outcome = ValidationOutcome::from_findings(findings);
        assert!(outcome.has_errors);
        assert_eq!(outcome.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_roi_never_computed_is_skipped() {
        let findings = derive_findings(&business_case(None), None, &[], &EngineConfig::default());
        assert!(findings.is_empty());
    }
}
