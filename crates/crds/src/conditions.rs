//! Status conditions
//!
//! A flat condition list plus the `Conditions` capability trait. Objects that
//! carry conditions implement the trait directly; the helpers below keep the
//! list ordered and only move `lastTransitionTime` when a status flips.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Summary condition, always sorted first.
pub const READY_CONDITION: &str = "Ready";

/// Condition status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// Condition holds.
    True,
    /// Condition does not hold.
    False,
    /// Not yet evaluated.
    #[default]
    Unknown,
}

/// How serious a `False` condition is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionSeverity {
    /// Reconciliation cannot proceed without intervention.
    Error,
    /// Something is wrong but progress continues.
    Warning,
    /// Expected intermediate state.
    Info,
}

/// A single observed condition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. "EKSControlPlaneReady".
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition.
    pub status: ConditionStatus,

    /// Severity when status is False.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,

    /// Last time the status changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// Machine readable reason in CamelCase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// A True condition.
    pub fn true_(type_: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status: ConditionStatus::True,
            severity: None,
            last_transition_time: None,
            reason: None,
            message: None,
        }
    }

    /// A False condition with reason and message.
    pub fn false_(type_: &str, reason: &str, severity: ConditionSeverity, message: impl Into<String>) -> Self {
        Self {
            type_: type_.to_string(),
            status: ConditionStatus::False,
            severity: Some(severity),
            last_transition_time: None,
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }

    fn same_state(&self, other: &Condition) -> bool {
        self.status == other.status
            && self.severity == other.severity
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Capability implemented by objects that expose a condition list.
pub trait Conditions {
    /// Current conditions.
    fn conditions(&self) -> &[Condition];

    /// Replace the condition list.
    fn set_conditions(&mut self, conditions: Vec<Condition>);
}

/// Look up a condition by type.
pub fn get<'a, T: Conditions + ?Sized>(obj: &'a T, type_: &str) -> Option<&'a Condition> {
    obj.conditions().iter().find(|c| c.type_ == type_)
}

/// True when the condition exists and is True.
pub fn is_true<T: Conditions + ?Sized>(obj: &T, type_: &str) -> bool {
    get(obj, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Set a condition, keeping the previous transition time when nothing changed.
pub fn set<T: Conditions + ?Sized>(obj: &mut T, mut condition: Condition) {
    let mut conditions = obj.conditions().to_vec();
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.same_state(&condition) {
                return;
            }
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time
            } else {
                Some(Utc::now())
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(Utc::now());
            conditions.push(condition);
        }
    }
    conditions.sort_by(|a, b| {
        let a_ready = a.type_ == READY_CONDITION;
        let b_ready = b.type_ == READY_CONDITION;
        b_ready.cmp(&a_ready).then_with(|| a.type_.cmp(&b.type_))
    });
    obj.set_conditions(conditions);
}

/// Mark a condition True.
pub fn mark_true<T: Conditions + ?Sized>(obj: &mut T, type_: &str) {
    set(obj, Condition::true_(type_));
}

/// Mark a condition False.
pub fn mark_false<T: Conditions + ?Sized>(
    obj: &mut T,
    type_: &str,
    reason: &str,
    severity: ConditionSeverity,
    message: impl Into<String>,
) {
    set(obj, Condition::false_(type_, reason, severity, message));
}
