//! Alert lifecycle diffing between two polls.
//!
//! The caller keeps the previous poll's alerts and hands both snapshots in;
//! nothing here holds state between calls.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{AlertRecord, AlertSeverity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChangeKind {
    New,
    Updated,
    Cancelled,
}

/// One classified change to a hazard alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertChange {
    pub kind: AlertChangeKind,
    pub alert_id: String,
    pub title: String,
    /// Set for updates only
    pub old_severity: Option<AlertSeverity>,
    /// Set for updates only
    pub new_severity: Option<AlertSeverity>,
}

impl AlertChange {
    fn new_alert(alert: &AlertRecord) -> Self {
        Self {
            kind: AlertChangeKind::New,
            alert_id: alert.id.clone(),
            title: alert.title.clone(),
            old_severity: None,
            new_severity: None,
        }
    }

    fn updated(previous: &AlertRecord, current: &AlertRecord) -> Self {
        Self {
            kind: AlertChangeKind::Updated,
            alert_id: current.id.clone(),
            title: current.title.clone(),
            old_severity: Some(previous.severity),
            new_severity: Some(current.severity),
        }
    }

    fn cancelled(alert: &AlertRecord) -> Self {
        Self {
            kind: AlertChangeKind::Cancelled,
            alert_id: alert.id.clone(),
            title: alert.title.clone(),
            old_severity: None,
            new_severity: None,
        }
    }

    /// True when the severity rank went up between the two polls.
    pub fn is_severity_upgrade(&self) -> bool {
        match (self.old_severity, self.new_severity) {
            (Some(old), Some(new)) => new.priority() > old.priority(),
            _ => false,
        }
    }
}

/// Structured change report for one poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLifecycleDiff {
    pub new_alerts: Vec<AlertChange>,
    pub updated_alerts: Vec<AlertChange>,
    pub cancelled_alerts: Vec<AlertChange>,
    pub summary: String,
}

impl AlertLifecycleDiff {
    pub fn has_changes(&self) -> bool {
        !self.new_alerts.is_empty()
            || !self.updated_alerts.is_empty()
            || !self.cancelled_alerts.is_empty()
    }
}

/// Compare the previous and current alert snapshots.
///
/// `None` is treated as an empty snapshot. When an id appears more than once
/// in a snapshot, its last occurrence wins. Changes are listed in the order
/// their alerts appear in the snapshot they come from.
pub fn diff(previous: Option<&[AlertRecord]>, current: Option<&[AlertRecord]>) -> AlertLifecycleDiff {
    let previous = previous.unwrap_or_default();
    let current = current.unwrap_or_default();

    let previous_by_id = index_by_id(previous);
    let current_by_id = index_by_id(current);

    let mut new_alerts = Vec::new();
    let mut updated_alerts = Vec::new();
    let mut seen = HashSet::new();

    for alert in current {
        if !seen.insert(alert.id.as_str()) {
            continue;
        }
        let latest = current_by_id[alert.id.as_str()];
        match previous_by_id.get(alert.id.as_str()) {
            None => new_alerts.push(AlertChange::new_alert(latest)),
            Some(prior) if has_changed(prior, latest) => {
                updated_alerts.push(AlertChange::updated(prior, latest));
            }
            Some(_) => {}
        }
    }

    let mut cancelled_alerts = Vec::new();
    let mut seen = HashSet::new();
    for alert in previous {
        if !seen.insert(alert.id.as_str()) {
            continue;
        }
        if !current_by_id.contains_key(alert.id.as_str()) {
            cancelled_alerts.push(AlertChange::cancelled(previous_by_id[alert.id.as_str()]));
        }
    }

    let summary = summarize(&new_alerts, &updated_alerts, &cancelled_alerts);
    if !new_alerts.is_empty() || !updated_alerts.is_empty() || !cancelled_alerts.is_empty() {
        tracing::debug!(
            new = new_alerts.len(),
            updated = updated_alerts.len(),
            cancelled = cancelled_alerts.len(),
            "Alert changes detected"
        );
    }

    AlertLifecycleDiff {
        new_alerts,
        updated_alerts,
        cancelled_alerts,
        summary,
    }
}

fn index_by_id(alerts: &[AlertRecord]) -> HashMap<&str, &AlertRecord> {
    alerts.iter().map(|a| (a.id.as_str(), a)).collect()
}

fn has_changed(previous: &AlertRecord, current: &AlertRecord) -> bool {
    previous.content_hash != current.content_hash
        || previous.severity != current.severity
        || previous.urgency != current.urgency
}

fn summarize(new: &[AlertChange], updated: &[AlertChange], cancelled: &[AlertChange]) -> String {
    let mut parts = Vec::with_capacity(3);

    if !new.is_empty() {
        let noun = if new.len() == 1 { "alert" } else { "alerts" };
        parts.push(format!("{} new {}", new.len(), noun));
    }

    if !updated.is_empty() {
        let mut fragment = format!("{} updated", updated.len());
        let top_upgrade = updated
            .iter()
            .filter(|c| c.is_severity_upgrade())
            .filter_map(|c| c.new_severity)
            .max_by_key(|s| s.priority());
        if let Some(severity) = top_upgrade {
            fragment.push_str(&format!(" (severity upgraded to {})", severity));
        }
        parts.push(fragment);
    }

    if !cancelled.is_empty() {
        parts.push(format!("{} cancelled", cancelled.len()));
    }

    if parts.is_empty() {
        "No changes".to_string()
    } else {
        parts.join(", ")
    }
}
