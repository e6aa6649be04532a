//! Monitoring alerts and the bounded recent-alerts buffer.

use crate::{
    monitoring_engine::Operator,
    types::{RiskId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_ALERT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    KriBreach,
    ControlIneffective,
    MonitoringError,
}

/// Threshold context attached to a KRI breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreachDetail {
    pub threshold: f64,
    pub operator: Operator,
    pub current_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub risk_id: RiskId,
    /// KRI id or control id the alert is about.
    pub subject_id: String,
    pub message: String,
    pub detected_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breach: Option<BreachDetail>,
}

impl Alert {
    pub fn kri_breach(
        risk_id: &str,
        kri_id: &str,
        detail: BreachDetail,
        detected_at: Timestamp,
    ) -> Self {
        let message = format!(
            "KRI '{kri_id}' breached threshold ({} {}). Current value: {:.2} for Risk '{risk_id}'.",
            detail.operator, detail.threshold, detail.current_value
        );
        Self {
            kind: AlertKind::KriBreach,
            risk_id: risk_id.to_string(),
            subject_id: kri_id.to_string(),
            message,
            detected_at,
            breach: Some(detail),
        }
    }

    pub fn control_ineffective(risk_id: &str, control_id: &str, detected_at: Timestamp) -> Self {
        Self {
            kind: AlertKind::ControlIneffective,
            risk_id: risk_id.to_string(),
            subject_id: control_id.to_string(),
            message: format!(
                "Control '{control_id}' for Risk '{risk_id}' assessed as ineffective."
            ),
            detected_at,
            breach: None,
        }
    }

    pub fn monitoring_error(
        risk_id: &str,
        subject_id: &str,
        error: impl std::fmt::Display,
        detected_at: Timestamp,
    ) -> Self {
        Self {
            kind: AlertKind::MonitoringError,
            risk_id: risk_id.to_string(),
            subject_id: subject_id.to_string(),
            message: format!("Failed to monitor '{subject_id}': {error}"),
            detected_at,
            breach: None,
        }
    }
}

/// Fixed-capacity FIFO: pushing past capacity evicts the oldest alert.
#[derive(Debug, Clone)]
pub struct AlertBuffer {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl AlertBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, alert: Alert) {
        if self.capacity == 0 {
            return;
        }
        while self.alerts.len() >= self.capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    pub fn extend(&mut self, alerts: impl IntoIterator<Item = Alert>) {
        for alert in alerts {
            self.push(alert);
        }
    }

    /// The newest `n` alerts, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Alert> {
        let skip = self.alerts.len().saturating_sub(n);
        self.alerts.iter().skip(skip).cloned().collect()
    }

    pub fn all(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AlertBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn err(n: usize) -> Alert {
        Alert::monitoring_error("RISK-001", &format!("KRI_{n}"), "timeout", Utc::now())
    }

    #[test]
    fn evicts_oldest_first() {
        let mut buf = AlertBuffer::new(3);
        buf.extend((0..5).map(err));
        assert_eq!(buf.len(), 3);
        let subjects: Vec<_> = buf.all().into_iter().map(|a| a.subject_id).collect();
        assert_eq!(subjects, vec!["KRI_2", "KRI_3", "KRI_4"]);
        assert_eq!(buf.recent(1)[0].subject_id, "KRI_4");
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut buf = AlertBuffer::new(0);
        buf.push(err(0));
        assert!(buf.is_empty());
    }
}
