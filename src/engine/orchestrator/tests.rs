use super::*;
use crate::config::ConfigManager;
use crate::db::init_schema;
use crate::domain::business_case::NewBusinessCase;
use crate::domain::determination::{BcDetermination, Quantities};
use crate::domain::operational::OperationalData;
use crate::domain::types::{PurchaseType, Stage};
use crate::engine::error::EngineError;
use crate::repository::{BcDeterminationRepository, BusinessCaseRepository};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

// ==========================================
// 测试辅助
// ==========================================

fn shared_conn() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn.execute_batch(
        r#"
        INSERT INTO equipment (id, name, capacity_per_hour, max_daily_capacity, base_price)
        VALUES ('eq-1', '生化分析仪', 100, NULL, 10000);
        INSERT INTO catalog_determinations (id, name, volume_per_test, reagent_consumption, wash_cycles, cost_per_test)
        VALUES ('det-a', '葡萄糖', 1.0, 0.5, 0, 2.0);
        "#,
    )
    .unwrap();
    Arc::new(Mutex::new(conn))
}

fn orchestrator(conn: &Arc<Mutex<Connection>>) -> BusinessCaseOrchestrator {
    let config = Arc::new(ConfigManager::from_connection(conn.clone()).unwrap());
    BusinessCaseOrchestrator::new(conn.clone(), config)
}

fn new_case(equipment_id: Option<&str>) -> NewBusinessCase {
    NewBusinessCase {
        client_name: "中心医院".to_string(),
        purchase_type: Some(PurchaseType::ComodatoPublico),
        equipment_id: equipment_id.map(|s| s.to_string()),
        created_by: Some("alice".to_string()),
        ..Default::default()
    }
}

fn add_line(conn: &Arc<Mutex<Connection>>, bc_id: &str, monthly: i64) {
    let guard = conn.lock().unwrap();
    BcDeterminationRepository::upsert_tx(
        &guard,
        bc_id,
        "det-a",
        Quantities {
            monthly,
            annual: monthly * 12,
        },
        None,
        None,
    )
    .unwrap();
}

fn stage_of(conn: &Arc<Mutex<Connection>>, bc_id: &str) -> Stage {
    let guard = conn.lock().unwrap();
    BusinessCaseRepository::get_tx(&guard, bc_id).unwrap().stage
}

// ==========================================
// 创建与阶段迁移
// ==========================================

#[test]
fn test_create_economic_bc_starts_in_draft() {
    let conn = shared_conn();
    let orch = orchestrator(&conn);
    let bc = orch.create_economic_bc(&new_case(Some("eq-1"))).unwrap();

    assert_eq!(bc.stage, Stage::Draft);
    assert_eq!(bc.duration_years, NewBusinessCase::DEFAULT_DURATION_YEARS);

    let history = orch.history(&bc.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_stage, None);
    assert_eq!(history[0].to_stage, Stage::Draft);
    assert_eq!(history[0].changed_by, "alice");
}

#[test]
fn test_create_rejects_blank_client_and_unknown_equipment() {
    let conn = shared_conn();
    let orch = orchestrator(&conn);

    let mut input = new_case(None);
    input.client_name = "   ".to_string();
    let err = orch.create_economic_bc(&input).unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput { ref field, .. } if field == "client_name"));

    let err = orch.create_economic_bc(&new_case(Some("eq-missing"))).unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[test]
fn test_invalid_transition_rolls_back() {
    let conn = shared_conn();
    let orch = orchestrator(&conn);
    let bc = orch.create_economic_bc(&new_case(None)).unwrap();

    let err = orch
        .promote_stage(&bc.id, Stage::PendingManagerApproval, "bob", None)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidStateTransition {
            from: Stage::Draft,
            to: Stage::PendingManagerApproval,
            ..
        }
    ));
    assert_eq!(stage_of(&conn, &bc.id), Stage::Draft);
    assert_eq!(orch.history(&bc.id).unwrap().len(), 1);
}

#[test]
fn test_approval_requires_calculated_roi() {
    let conn = shared_conn();
    let orch = orchestrator(&conn);
    let bc = orch.create_economic_bc(&new_case(Some("eq-1"))).unwrap();

    let err = orch.evaluate_economic_approval(&bc.id, "bob").unwrap_err();
    assert!(matches!(err, EngineError::MissingCalculation(_)));
}

#[test]
fn test_recalculation_requires_operational_data() {
    let conn = shared_conn();
    let orch = orchestrator(&conn);
    let bc = orch.create_economic_bc(&new_case(Some("eq-1"))).unwrap();
    orch.promote_stage(&bc.id, Stage::PendingOperationalData, "bob", None)
        .unwrap();

    let err = orch.recalculate_with_operational_data(&bc.id, "bob").unwrap_err();
    assert!(matches!(err, EngineError::MissingOperationalData(_)));
}

#[test]
fn test_recalculation_refused_before_economic_approval() {
    let conn = shared_conn();
    let orch = orchestrator(&conn);
    let bc = orch.create_economic_bc(&new_case(Some("eq-1"))).unwrap();
    // 年量 360000 远超默认运营产能，若执行重算会被截断
    add_line(&conn, &bc.id, 30_000);
    orch.attach_operational_data(&bc.id, &OperationalData::default())
        .unwrap();

    let err = orch.recalculate_with_operational_data(&bc.id, "bob").unwrap_err();
    assert!(matches!(err, EngineError::MissingPrerequisite { .. }));

    let guard = conn.lock().unwrap();
    let line = BcDeterminationRepository::find_tx(&guard, &bc.id, "det-a")
        .unwrap()
        .unwrap();
    assert_eq!(line.annual_quantity, 360_000);
    drop(guard);
    assert_eq!(stage_of(&conn, &bc.id), Stage::Draft);
}

// ==========================================
// 次级触发
// ==========================================

#[test]
fn test_best_effort_trigger_swallows_while_primary_propagates() {
    let conn = shared_conn();
    let orch = orchestrator(&conn);
    // 没有测定项: 主例程前置条件不满足
    let bc = orch.create_economic_bc(&new_case(Some("eq-1"))).unwrap();

    assert!(orch.trigger_recalculation(&bc.id, "investment_added").is_none());

    let err = orch.calculate_initial_roi(&bc.id).unwrap_err();
    assert!(matches!(err, EngineError::MissingPrerequisite { .. }));
}

// ==========================================
// 产能调整
// ==========================================

fn determination(annual: i64) -> BcDetermination {
    let now = crate::repository::current_timestamp();
    BcDetermination {
        id: "l-1".to_string(),
        business_case_id: "bc-1".to_string(),
        determination_id: "det-a".to_string(),
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
fn test_capacity_plan_clamps_only_excess() {
    // 5 × 1 × 8 × 52 × 60 = 124800
    let op = OperationalData::default();
    let adjustments = plan_capacity_adjustments(
        &[determination(200_000), determination(124_800)],
        &op,
        60.0,
    );
    assert_eq!(adjustments.len(), 1);
    let adj = &adjustments[0];
    assert_eq!(adj.previous_annual_quantity, 200_000);
    assert_eq!(adj.adjusted_annual_quantity, 124_800);
    assert_eq!(adj.adjusted_monthly_quantity, 10_400);
    assert!(adj.note.contains("200000 → 124800"));
}

// ==========================================
// 完整流程
// ==========================================

#[test]
fn test_full_workflow_reaches_manager_approval() {
    let conn = shared_conn();
    let orch = orchestrator(&conn);
    let bc = orch.create_economic_bc(&new_case(Some("eq-1"))).unwrap();
    add_line(&conn, &bc.id, 3_000);

    let calc = orch.calculate_initial_roi(&bc.id).unwrap();
    assert_eq!(calc.snapshot.calculation_version, 1);

    let decision = orch.evaluate_economic_approval(&bc.id, "manager").unwrap();
    assert!(decision.approved);
    assert_eq!(decision.new_stage, Stage::PendingOperationalData);

    orch.attach_operational_data(&bc.id, &OperationalData::default())
        .unwrap();
    let outcome = orch.recalculate_with_operational_data(&bc.id, "tech").unwrap();

    assert!(outcome.adjustments.is_empty());
    assert!(!outcome.validation.has_errors);
    assert_eq!(outcome.new_stage, Stage::PendingManagerApproval);
    assert_eq!(outcome.calculation.snapshot.calculation_version, 2);
    assert_eq!(stage_of(&conn, &bc.id), Stage::PendingManagerApproval);

    let stages: Vec<Stage> = orch
        .history(&bc.id)
        .unwrap()
        .iter()
        .map(|h| h.to_stage)
        .collect();
    assert_eq!(
        stages,
        vec![
            Stage::Draft,
            Stage::PendingOperationalData,
            Stage::PendingManagerApproval
        ]
    );
}
