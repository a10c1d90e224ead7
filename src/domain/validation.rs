// ==========================================
// 商业案例计算引擎 - 一致性校验结果
// ==========================================

use crate::domain::types::{FindingSeverity, RiskLevel};
use serde::{Deserialize, Serialize};

/// 校验发现类型
pub mod finding_types {
    pub const COHERENCE: &str = "coherence";
    pub const ROI: &str = "roi";
}

// ==========================================
// ValidationFinding - 单条校验发现
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    #[serde(rename = "type")]
    pub finding_type: String,
    pub severity: FindingSeverity,
    pub message: String,
}

impl ValidationFinding {
    pub fn new(finding_type: &str, severity: FindingSeverity, message: impl Into<String>) -> Self {
        Self {
            finding_type: finding_type.to_string(),
            severity,
            message: message.into(),
        }
    }
}

// ==========================================
// ValidationOutcome - 一次校验的汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub has_errors: bool,
    pub has_warnings: bool,
    pub findings: Vec<ValidationFinding>,
    pub risk_level: RiskLevel,
}

impl ValidationOutcome {
    pub fn from_findings(findings: Vec<ValidationFinding>) -> Self {
        let errors = count_by(&findings, FindingSeverity::Error);
        let warnings = count_by(&findings, FindingSeverity::Warning);
        Self {
            has_errors: errors > 0,
            has_warnings: warnings > 0,
            risk_level: classify_risk(errors, warnings),
            findings,
        }
    }
}

fn count_by(findings: &[ValidationFinding], severity: FindingSeverity) -> usize {
    findings.iter().filter(|f| f.severity == severity).count()
}

/// 风险分级：有错误 -> high；警告>=2 -> medium；否则 low
pub fn classify_risk(error_count: usize, warning_count: usize) -> RiskLevel {
    if error_count > 0 {
        RiskLevel::High
    } else if warning_count >= 2 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_risk_levels() {
        assert_eq!(classify_risk(0, 0), RiskLevel::Low);
        assert_eq!(classify_risk(0, 1), RiskLevel::Low);
        assert_eq!(classify_risk(0, 2), RiskLevel::Medium);
        assert_eq!(classify_risk(1, 0), RiskLevel::High);
        assert_eq!(classify_risk(3, 5), RiskLevel::High);
    }

    #[test]
    fn test_risk_monotonic_in_findings() {
        // 任何一步增加错误或警告，风险等级都不降低
        let mut prev = classify_risk(0, 0);
        for (e, w) in [(0, 1), (0, 2), (0, 3), (1, 3), (2, 3)] {
            let next = classify_risk(e, w);
            assert!(next >= prev, "({e},{w}) 风险等级下降");
            prev = next;
        }
    }

    #[test]
    fn test_outcome_flags() {
        let outcome = ValidationOutcome::from_findings(vec![ValidationFinding::new(
            finding_types::ROI,
            FindingSeverity::Error,
            "ROI 10% 低于目标 25%",
        )]);
        assert!(outcome.has_errors);
        assert!(!outcome.has_warnings);
        assert_eq!(outcome.risk_level, RiskLevel::High);
    }
}
