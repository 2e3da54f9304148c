//! Condition management helpers following Kubernetes API conventions

use chrono::Utc;

use crate::crd::Condition;

/// All resources of the last create pass converged.
pub const CONDITION_TYPE_CREATED: &str = "Created";
/// The tenant cluster is being torn down.
pub const CONDITION_TYPE_DELETING: &str = "Deleting";
/// The last pass failed or the spec is invalid.
pub const CONDITION_TYPE_DEGRADED: &str = "Degraded";

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

/// Update or add a condition to the conditions list
///
/// The transition time only moves when the status changes.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = Utc::now().to_rfc3339();
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = observed_generation;
    } else {
        conditions.push(Condition::new(
            type_,
            status,
            reason,
            message,
            observed_generation,
        ));
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == CONDITION_STATUS_TRUE)
        .unwrap_or(false)
}

fn bool_status(value: bool) -> &'static str {
    if value {
        CONDITION_STATUS_TRUE
    } else {
        CONDITION_STATUS_FALSE
    }
}

/// Record the result of a create pass.
pub fn set_created(
    conditions: &mut Vec<Condition>,
    created: bool,
    reason: &str,
    message: &str,
    generation: Option<i64>,
) {
    set_condition(
        conditions,
        CONDITION_TYPE_CREATED,
        bool_status(created),
        reason,
        message,
        generation,
    );
    set_condition(
        conditions,
        CONDITION_TYPE_DEGRADED,
        CONDITION_STATUS_FALSE,
        "NoIssues",
        "Last pass succeeded",
        generation,
    );
}

pub fn set_deleting(conditions: &mut Vec<Condition>, message: &str, generation: Option<i64>) {
    set_condition(
        conditions,
        CONDITION_TYPE_DELETING,
        CONDITION_STATUS_TRUE,
        "DeletionRequested",
        message,
        generation,
    );
}

pub fn set_degraded(
    conditions: &mut Vec<Condition>,
    reason: &str,
    message: &str,
    generation: Option<i64>,
) {
    set_condition(
        conditions,
        CONDITION_TYPE_DEGRADED,
        CONDITION_STATUS_TRUE,
        reason,
        message,
        generation,
    );
}
