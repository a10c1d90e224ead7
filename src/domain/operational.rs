// ==========================================
// 商业案例计算引擎 - 运营数据与LIS数据
// ==========================================
// 职责: 班次结构、质控频率、设备状态；LIS 集成信息
// ==========================================

use serde::{Deserialize, Serialize};

/// 每年周数（产能与质控年化口径）
pub const WEEKS_PER_YEAR: f64 = 52.0;

// ==========================================
// OperationalData - 运营数据 (1:1)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalData {
    pub work_days_per_week: i32,
    pub shifts_per_day: i32,
    pub hours_per_shift: f64,
    pub quality_controls_per_shift: i32,
    pub control_levels: i32,
    pub routine_qc_frequency: Option<String>,
    pub special_tests: Option<String>,
    pub special_qc_frequency: Option<String>,
    pub equipment_status: Option<String>,
    pub ownership_status: Option<String>,
    pub backup_equipment_name: Option<String>,
    pub backup_status: Option<String>,
    pub backup_manufacture_year: Option<i32>,
    pub installation_location: Option<String>,
    pub delivery_type: Option<String>,
    pub deadline_months: Option<i32>,
}

impl Default for OperationalData {
    fn default() -> Self {
        Self {
            work_days_per_week: 5,
            shifts_per_day: 1,
            hours_per_shift: 8.0,
            quality_controls_per_shift: 1,
            control_levels: 2,
            routine_qc_frequency: None,
            special_tests: None,
            special_qc_frequency: None,
            equipment_status: None,
            ownership_status: None,
            backup_equipment_name: None,
            backup_status: None,
            backup_manufacture_year: None,
            installation_location: None,
            delivery_type: None,
            deadline_months: None,
        }
    }
}

impl OperationalData {
    /// 每周运营小时
    pub fn weekly_operating_hours(&self) -> f64 {
        self.work_days_per_week as f64 * self.shifts_per_day as f64 * self.hours_per_shift
    }

    /// 年度质控测试量 = 每班质控 × 水平数 × 每日班次 × 每周天数 × 52
    pub fn annual_qc_tests(&self) -> f64 {
        self.quality_controls_per_shift as f64
            * self.control_levels as f64
            * self.shifts_per_day as f64
            * self.work_days_per_week as f64
            * WEEKS_PER_YEAR
    }

    /// 年度理论产能 = 天 × 班 × 时 × 52 × 每小时测试量
    pub fn annual_capacity(&self, tests_per_hour: f64) -> f64 {
        self.weekly_operating_hours() * WEEKS_PER_YEAR * tests_per_hour
    }

    /// 输入合法性校验
    ///
    /// # 返回
    /// - Ok(()): 合法
    /// - Err((field, message)): 首个非法字段
    pub fn check(&self) -> Result<(), (&'static str, String)> {
        if !(1..=7).contains(&self.work_days_per_week) {
            return Err((
                "work_days_per_week",
                format!("每周工作天数必须在1-7之间: {}", self.work_days_per_week),
            ));
        }
        if self.shifts_per_day < 1 {
            return Err((
                "shifts_per_day",
                format!("每日班次必须>=1: {}", self.shifts_per_day),
            ));
        }
        if !(self.hours_per_shift > 0.0) {
            return Err((
                "hours_per_shift",
                format!("每班小时数必须>0: {}", self.hours_per_shift),
            ));
        }
        if self.shifts_per_day as f64 * self.hours_per_shift > 24.0 {
            return Err((
                "hours_per_shift",
                format!(
                    "每日运营时长超过24小时: {}班 × {}小时",
                    self.shifts_per_day, self.hours_per_shift
                ),
            ));
        }
        if self.quality_controls_per_shift < 0 {
            return Err((
                "quality_controls_per_shift",
                "每班质控次数不能为负".to_string(),
            ));
        }
        if self.control_levels < 0 {
            return Err(("control_levels", "质控水平数不能为负".to_string()));
        }
        Ok(())
    }
}

// ==========================================
// LisData - LIS 集成数据 (1:1)
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LisData {
    pub includes_lis: bool,
    pub lis_provider: Option<String>,
    pub includes_hardware: bool,
    pub monthly_patients: Option<i64>,
    pub current_system_name: Option<String>,
    pub current_system_provider: Option<String>,
    pub current_system_hardware: Option<String>,
    #[serde(default)]
    pub equipment_interfaces: Vec<LisEquipmentInterface>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LisEquipmentInterface {
    pub model: String,
    pub provider: Option<String>,
}
