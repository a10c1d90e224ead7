// ==========================================
// 工作流端到端测试
// ==========================================
// 职责: 通过 BusinessCaseApi 验证完整审批流转
// 场景:
// - draft -> 经济审批 -> 运营数据 -> 经理审批
// - ROI 不达标 -> rejected（终态）
// - 追加投资导致 ROI 不达标 -> 技术复核 -> 修正后回到经理审批
// - 运营产能不足 -> 自动截断测定项
// ==========================================


#[cfg(test)]
mod workflow_e2e_test {
    use crate::test_helpers::{create_test_state, monthly_line, new_case};
    use business_case_engine::api::ApiError;
    use business_case_engine::domain::business_case::NewBusinessCase;
    use business_case_engine::domain::investment::{InvestmentPatch, NewInvestment};
    use business_case_engine::domain::operational::{LisData, OperationalData};
    use business_case_engine::domain::types::{
        FindingSeverity, InvestmentCategory, InvestmentType, PurchaseType, RiskLevel, Stage,
    };
    use business_case_engine::logging;
    use serde_json::json;

    fn stages(api: &business_case_engine::api::BusinessCaseApi, bc_id: &str) -> Vec<Stage> {
        api.history(bc_id)
            .unwrap()
            .iter()
            .map(|h| h.to_stage)
            .collect()
    }

    // ==========================================
    // 正常流程
    // ==========================================

    #[test]
    fn test_full_workflow_to_manager_approval() {
        logging::init_test();
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;

        let bc = api
            .create_business_case(&new_case(PurchaseType::ComodatoPublico, Some("eq-chem")))
            .unwrap();
        assert_eq!(bc.stage, Stage::Draft);

        api.add_determination(&bc.id, &monthly_line("det-glu", 3_000))
            .unwrap();
        let calc = api.calculate_roi(&bc.id).unwrap();
        assert_eq!(calc.snapshot.rentability.roi_percentage, 620.0);

        let decision = api.evaluate_approval(&bc.id, "finance").unwrap();
        assert!(decision.approved);
        assert_eq!(decision.new_stage, Stage::PendingOperationalData);

        api.attach_operational_data(&bc.id, &OperationalData::default())
            .unwrap();
        api.attach_lis_data(
            &bc.id,
            &LisData {
                includes_lis: true,
                lis_provider: Some("LabSys".to_string()),
                monthly_patients: Some(1_200),
                ..Default::default()
            },
        )
        .unwrap();

        let outcome = api.recalculate(&bc.id, "tech").unwrap();
        assert!(outcome.adjustments.is_empty());
        assert!(!outcome.validation.has_errors);
        assert!(!outcome.validation.has_warnings);
        assert_eq!(outcome.new_stage, Stage::PendingManagerApproval);

        let bc = api.get_business_case(&bc.id).unwrap();
        assert_eq!(bc.stage, Stage::PendingManagerApproval);
        assert!(bc.economic_data_complete);
        assert!(bc.operational_data_complete);
        assert!(bc.lis_data_complete);
        assert!(!bc.has_inconsistencies);
        assert_eq!(bc.risk_level, Some(RiskLevel::Low));

        assert_eq!(
            stages(api, &bc.id),
            vec![
                Stage::Draft,
                Stage::PendingOperationalData,
                Stage::PendingManagerApproval
            ]
        );
        let history = api.history(&bc.id).unwrap();
        assert_eq!(history[1].changed_by, "finance");
        assert!(history[1].notes.as_deref().unwrap_or("").contains("经济审批通过"));
    }

    #[test]
    fn test_low_roi_is_rejected_and_terminal() {
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;

        let input = NewBusinessCase {
            equipment_cost: Some(1_000_000.0),
            ..new_case(PurchaseType::ComodatoPublico, Some("eq-chem"))
        };
        let bc = api.create_business_case(&input).unwrap();
        api.add_determination(&bc.id, &monthly_line("det-glu", 3_000))
            .unwrap();
        api.calculate_roi(&bc.id).unwrap();

        let decision = api.evaluate_approval(&bc.id, "finance").unwrap();
        assert!(!decision.approved);
        assert!(decision.roi_percentage < decision.target_margin_percentage);
        assert_eq!(decision.new_stage, Stage::Rejected);

        let err = api
            .promote_stage(&bc.id, "pending_operational_data", "finance", None)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidStateTransition { .. }));
        assert_eq!(stages(api, &bc.id), vec![Stage::Draft, Stage::Rejected]);
    }

    #[test]
    fn test_promote_stage_rejects_unknown_stage_name() {
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;
        let bc = api
            .create_business_case(&new_case(PurchaseType::ComodatoPublico, None))
            .unwrap();

        let err = api
            .promote_stage(&bc.id, "approved", "finance", None)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    // ==========================================
    // 技术复核往返
    // ==========================================

    #[test]
    fn test_investment_pushes_case_to_technical_review_and_back() {
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;

        let bc = api
            .create_business_case(&new_case(PurchaseType::ComodatoPublico, Some("eq-chem")))
            .unwrap();
        api.add_determination(&bc.id, &monthly_line("det-glu", 3_000))
            .unwrap();
        api.calculate_roi(&bc.id).unwrap();
        api.evaluate_approval(&bc.id, "finance").unwrap();
        api.attach_operational_data(&bc.id, &OperationalData::default())
            .unwrap();

        // 总投资 110000: ROI = (72000 - 110000) / 110000 < 25%
        let investment = api
            .add_investment(
                &bc.id,
                &NewInvestment {
                    concept: "实验室改造".to_string(),
                    amount: 100_000.0,
                    investment_type: InvestmentType::OneTime,
                    category: InvestmentCategory::Installation,
                    notes: None,
                },
            )
            .unwrap();
        // 次级重算不改变阶段
        assert_eq!(
            api.get_business_case(&bc.id).unwrap().stage,
            Stage::PendingOperationalData
        );

        let outcome = api.recalculate(&bc.id, "tech").unwrap();
        assert!(outcome.validation.has_errors);
        assert_eq!(outcome.new_stage, Stage::PendingTechnicalReview);

        let findings = api.list_findings(&bc.id).unwrap();
        assert!(findings
            .iter()
            .any(|f| f.severity == FindingSeverity::Error && f.message.contains("ROI")));
        let bc_after = api.get_business_case(&bc.id).unwrap();
        assert!(bc_after.has_inconsistencies);

        api.delete_investment(&investment.id).unwrap();
        let outcome = api.recalculate(&bc.id, "tech").unwrap();
        assert!(!outcome.validation.has_errors);
        assert_eq!(outcome.new_stage, Stage::PendingManagerApproval);
        assert!(api.list_findings(&bc.id).unwrap().is_empty());

        assert_eq!(
            stages(api, &bc.id),
            vec![
                Stage::Draft,
                Stage::PendingOperationalData,
                Stage::PendingTechnicalReview,
                Stage::PendingManagerApproval
            ]
        );
    }

    #[test]
    fn test_validation_is_idempotent() {
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;

        let bc = api
            .create_business_case(&new_case(PurchaseType::ComodatoPublico, Some("eq-chem")))
            .unwrap();
        api.add_determination(&bc.id, &monthly_line("det-glu", 3_000))
            .unwrap();
        api.calculate_roi(&bc.id).unwrap();
        api.evaluate_approval(&bc.id, "finance").unwrap();
        // 40 × 2 × 1 × 5 × 52 = 20800 质控测试，占年量 36000 的 57.8%
        api.attach_operational_data(
            &bc.id,
            &OperationalData {
                quality_controls_per_shift: 40,
                ..OperationalData::default()
            },
        )
        .unwrap();

        let first = state.validation_engine.validate_coherence(&bc.id).unwrap();
        let second = state.validation_engine.validate_coherence(&bc.id).unwrap();
        assert_eq!(first.findings.len(), second.findings.len());
        assert_eq!(first.risk_level, second.risk_level);
        assert!(first.has_warnings);
        assert_eq!(api.list_findings(&bc.id).unwrap().len(), first.findings.len());
    }

    // ==========================================
    // 产能截断
    // ==========================================

    #[test]
    fn test_recalculation_clamps_to_operational_capacity() {
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;

        let bc = api
            .create_business_case(&new_case(PurchaseType::ComodatoPublico, Some("eq-chem")))
            .unwrap();
        api.add_determination(&bc.id, &monthly_line("det-glu", 3_000))
            .unwrap();
        api.calculate_roi(&bc.id).unwrap();
        api.evaluate_approval(&bc.id, "finance").unwrap();

        // 2 天 × 1 班 × 2 小时 × 52 × 60/h = 12480 次/年
        let operational = OperationalData {
            work_days_per_week: 2,
            shifts_per_day: 1,
            hours_per_shift: 2.0,
            ..OperationalData::default()
        };
        api.attach_operational_data(&bc.id, &operational).unwrap();

        let outcome = api.recalculate(&bc.id, "tech").unwrap();
        assert_eq!(outcome.adjustments.len(), 1);
        let adj = &outcome.adjustments[0];
        assert_eq!(adj.previous_annual_quantity, 36_000);
        assert_eq!(adj.adjusted_annual_quantity, 12_480);
        assert_eq!(adj.adjusted_monthly_quantity, 1_040);

        let lines = api.list_determinations(&bc.id).unwrap();
        assert_eq!(lines[0].monthly_quantity, 1_040);
        assert_eq!(lines[0].annual_quantity, 12_480);
        assert!(lines[0].notes.as_deref().unwrap_or("").contains("自动调整"));
        assert_eq!(outcome.calculation.snapshot.totals.total_monthly_tests, 1_040.0);
    }

    #[test]
    fn test_invalid_operational_data_is_rejected() {
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;
        let bc = api
            .create_business_case(&new_case(PurchaseType::ComodatoPublico, Some("eq-chem")))
            .unwrap();

        let err = api
            .attach_operational_data(
                &bc.id,
                &OperationalData {
                    shifts_per_day: 3,
                    hours_per_shift: 10.0,
                    ..OperationalData::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert!(!api.get_business_case(&bc.id).unwrap().operational_data_complete);
    }

    // ==========================================
    // 次级编辑
    // ==========================================

    #[test]
    fn test_secondary_edit_survives_failed_recalculation() {
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;

        // 没有测定项时重算失败，但投资仍然写入
        let bc = api
            .create_business_case(&new_case(PurchaseType::ComodatoPublico, Some("eq-chem")))
            .unwrap();
        let investment = api
            .add_investment(
                &bc.id,
                &NewInvestment {
                    concept: "培训".to_string(),
                    amount: 500.0,
                    investment_type: InvestmentType::RecurringMonthly,
                    category: InvestmentCategory::Training,
                    notes: None,
                },
            )
            .unwrap();
        assert_eq!(api.list_investments(&bc.id).unwrap().len(), 1);
        assert!(api.get_calculation(&bc.id).unwrap().is_none());

        let updated = api
            .update_investment(
                &investment.id,
                &InvestmentPatch {
                    amount: Some(750.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.amount, 750.0);
        assert_eq!(updated.concept, "培训");

        let totals = api.investment_totals(&bc.id).unwrap();
        assert_eq!(totals.recurring_monthly, 750.0);
        assert_eq!(totals.one_time, 0.0);

        let err = api
            .update_investment(
                &investment.id,
                &InvestmentPatch {
                    amount: Some(-1.0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[test]
    fn test_changing_primary_equipment_clears_determinations() {
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;

        let bc = api
            .create_business_case(&new_case(PurchaseType::ComodatoPublico, Some("eq-chem")))
            .unwrap();
        api.add_determination(&bc.id, &monthly_line("det-glu", 100))
            .unwrap();

        // 重选同一设备不清空
        let same = api.select_equipment(&bc.id, "eq-chem").unwrap();
        assert_eq!(same.cleared_determinations, 0);
        assert_eq!(api.list_determinations(&bc.id).unwrap().len(), 1);

        let changed = api.select_equipment(&bc.id, "eq-hema").unwrap();
        assert_eq!(changed.cleared_determinations, 1);
        assert!(api.list_determinations(&bc.id).unwrap().is_empty());

        let economic = api.get_economic_data(&bc.id).unwrap().unwrap();
        assert_eq!(economic.equipment_id.as_deref(), Some("eq-hema"));
        assert_eq!(economic.equipment_name.as_deref(), Some("血液分析仪 H-5"));
    }

    #[test]
    fn test_update_and_remove_determination() {
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;

        let bc = api
            .create_business_case(&new_case(PurchaseType::ComodatoPublico, Some("eq-chem")))
            .unwrap();
        let err = api
            .update_determination(&bc.id, &monthly_line("det-glu", 10))
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        api.add_determination(&bc.id, &monthly_line("det-glu", 10))
            .unwrap();
        let updated = api
            .update_determination(&bc.id, &monthly_line("det-glu", 20))
            .unwrap();
        assert_eq!(updated.monthly_quantity, 20);
        assert_eq!(updated.annual_quantity, 240);
        assert_eq!(updated.calculated_cost, Some(40.0));

        api.remove_determination(&bc.id, "det-glu").unwrap();
        let err = api.remove_determination(&bc.id, "det-glu").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    // ==========================================
    // 公式试算与模板
    // ==========================================

    #[test]
    fn test_validate_formula_dry_run() {
        let (_tmp, state) = create_test_state();
        let api = &state.business_case_api;

        let ok = api
            .validate_formula(
                &json!({"type": "expression", "expression": "a * b + 1"}),
                &serde_json::from_value(json!({"a": 2, "b": 3})).unwrap(),
            )
            .unwrap();
        assert!(ok.is_valid);
        assert_eq!(ok.result, Some(7.0));

        let lookup = api
            .validate_formula(
                &json!({
                    "type": "expression",
                    "expression": "unit_price * 10",
                    "variables": {"unit_price": {"source": "lookup", "table": "reagent_prices",
                                                 "key": "determination_id", "value": "unit_price"}}
                }),
                &serde_json::from_value(json!({"determination_id": "det-glu"})).unwrap(),
            )
            .unwrap();
        assert_eq!(lookup.result, Some(35.0));

        let rejected = api
            .validate_formula(
                &json!({"type": "expression", "expression": "__import__('os').system('ls')"}),
                &Default::default(),
            )
            .unwrap();
        assert!(!rejected.is_valid);
        assert!(rejected.result.is_none());
        assert!(rejected.error.is_some());
    }

    #[test]
    fn test_list_active_templates() {
        let (_tmp, state) = create_test_state();
        let templates = state.business_case_api.list_templates(None).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].id, "tpl-std");
        assert!(state
            .business_case_api
            .list_templates(Some("cost"))
            .unwrap()
            .is_empty());
    }
}
