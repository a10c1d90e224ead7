// ==========================================
// 工作流编排器 - 阶段迁移与案例创建（事务内）
// ==========================================

use crate::domain::business_case::{BusinessCase, EconomicData, NewBusinessCase};
use crate::domain::types::Stage;
use crate::domain::workflow::NewWorkflowHistoryEntry;
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::{
    current_timestamp, BusinessCaseRepository, EquipmentSelectionRepository,
    ReferenceDataRepository, WorkflowHistoryRepository,
};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

/// 推进阶段: 校验迁移合法性 -> 追加历史 -> 更新阶段
///
/// # 返回
/// - Err(InvalidStateTransition): 不允许的迁移
pub(crate) fn promote_stage_tx(
    conn: &Connection,
    bc_id: &str,
    new_stage: Stage,
    user: &str,
    notes: Option<&str>,
) -> EngineResult<BusinessCase> {
    let bc = BusinessCaseRepository::get_tx(conn, bc_id)?;
    if !bc.stage.can_transition_to(new_stage) {
        return Err(EngineError::InvalidStateTransition {
            bc_id: bc_id.to_string(),
            from: bc.stage,
            to: new_stage,
        });
    }

    WorkflowHistoryRepository::append_tx(
        conn,
        &NewWorkflowHistoryEntry {
            business_case_id: bc_id,
            from_stage: Some(bc.stage),
            to_stage: new_stage,
            changed_by: user,
            notes,
        },
    )?;
    BusinessCaseRepository::update_stage_tx(conn, bc_id, new_stage)?;

    info!(
        bc_id = bc_id,
        from = %bc.stage,
        to = %new_stage,
        changed_by = user,
        "阶段已推进"
    );
    Ok(BusinessCase {
        stage: new_stage,
        ..bc
    })
}

/// 校验创建入参
fn check_new_business_case(input: &NewBusinessCase) -> EngineResult<()> {
    if input.client_name.trim().is_empty() {
        return Err(EngineError::invalid_input("client_name", "客户名称不能为空"));
    }
    if let Some(years) = input.duration_years {
        if years < 1 {
            return Err(EngineError::invalid_input(
                "duration_years",
                format!("合同年限必须>=1: {}", years),
            ));
        }
    }
    if let Some(margin) = input.target_margin_percentage {
        if !(0.0..100.0).contains(&margin) {
            return Err(EngineError::invalid_input(
                "target_margin_percentage",
                format!("目标毛利率必须在[0,100)之间: {}", margin),
            ));
        }
    }
    if let Some(cost) = input.equipment_cost {
        if !(cost >= 0.0) || !cost.is_finite() {
            return Err(EngineError::invalid_input(
                "equipment_cost",
                format!("设备成本不能为负: {}", cost),
            ));
        }
    }
    Ok(())
}

/// 创建经济案例: 主档(draft) + 经济数据 + 主设备(可选) + 历史(null -> draft)
pub(crate) fn create_business_case_tx(
    conn: &Connection,
    input: &NewBusinessCase,
) -> EngineResult<BusinessCase> {
    check_new_business_case(input)?;

    let equipment = match input.equipment_id.as_deref() {
        Some(id) => Some(ReferenceDataRepository::get_equipment_tx(conn, id)?),
        None => None,
    };

    let now = current_timestamp();
    let created_by = input
        .created_by
        .clone()
        .unwrap_or_else(|| NewBusinessCase::DEFAULT_CREATED_BY.to_string());
    let bc = BusinessCase {
        id: Uuid::new_v4().to_string(),
        client_id: input.client_id.clone(),
        client_name: input.client_name.trim().to_string(),
        purchase_type: input.purchase_type.unwrap_or_default(),
        duration_years: input
            .duration_years
            .unwrap_or(NewBusinessCase::DEFAULT_DURATION_YEARS),
        target_margin_percentage: input
            .target_margin_percentage
            .unwrap_or(NewBusinessCase::DEFAULT_TARGET_MARGIN),
        process_code: input.process_code.clone(),
        contract_object: input.contract_object.clone(),
        stage: Stage::Draft,
        created_by: created_by.clone(),
        calculated_roi_percentage: None,
        calculated_payback_months: None,
        monthly_margin: None,
        annual_margin: None,
        monthly_revenue: None,
        annual_revenue: None,
        monthly_cost: None,
        annual_cost: None,
        total_investment: None,
        equipment_investment: None,
        economic_data_complete: false,
        operational_data_complete: false,
        lis_data_complete: false,
        has_inconsistencies: false,
        inconsistency_details: None,
        risk_level: None,
        created_at: now,
        updated_at: now,
    };
    BusinessCaseRepository::insert_tx(conn, &bc)?;

    let economic = EconomicData {
        business_case_id: bc.id.clone(),
        equipment_id: equipment.as_ref().map(|e| e.id.clone()),
        equipment_name: input
            .equipment_name
            .clone()
            .or_else(|| equipment.as_ref().map(|e| e.name.clone())),
        equipment_cost: input
            .equipment_cost
            .or_else(|| equipment.as_ref().and_then(|e| e.base_price))
            .unwrap_or(0.0),
        calculation_mode: input.calculation_mode,
        show_roi: input.show_roi.unwrap_or(true),
        show_margin: input.show_margin.unwrap_or(true),
    };
    BusinessCaseRepository::insert_economic_data_tx(conn, &economic)?;

    if let Some(eq) = &equipment {
        EquipmentSelectionRepository::set_primary_tx(conn, &bc.id, &eq.id)?;
    }

    WorkflowHistoryRepository::append_tx(
        conn,
        &NewWorkflowHistoryEntry {
            business_case_id: &bc.id,
            from_stage: None,
            to_stage: Stage::Draft,
            changed_by: &created_by,
            notes: Some("创建经济案例"),
        },
    )?;

    info!(
        bc_id = %bc.id,
        client = %bc.client_name,
        purchase_type = %bc.purchase_type,
        "商业案例已创建"
    );
    Ok(bc)
}
