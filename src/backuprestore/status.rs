//! Status condition management for backup and restore requests.
//!
//! Conditions are append-only.  Each append is written as a JSON merge patch
//! (RFC 7386) computed from the status before and after the change, so the
//! request carries exactly the paths that changed and nothing else.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::api::ResourceApi;
use crate::crd::shared::{Condition, ConditionStatus};
use crate::error::Result;

use super::request::ConvergenceRequest;

/// Stamp `condition`, append it to the request's conditions and persist the
/// change with a merge patch against the matching status subresource.
///
/// The in-memory request is only updated once the patch has been accepted.
pub async fn append_condition(
    api: &dyn ResourceApi,
    request: &mut ConvergenceRequest,
    mut condition: Condition,
) -> Result<()> {
    let old = json!({ "status": serde_json::to_value(&request.status)? });

    condition.last_transition_time = Some(Time(Utc::now()));
    let mut status = request.status.clone();
    status.conditions.push(condition);
    let new = json!({ "status": serde_json::to_value(&status)? });

    let patch = create_merge_patch(&old, &new);
    debug!(
        key = %request.key(),
        action = %request.action,
        %patch,
        "appending status condition"
    );
    api.merge_patch_status(
        request.action.patch_target(),
        &request.namespace,
        &request.name,
        &patch,
    )
    .await?;

    request.status = status;
    Ok(())
}

/// Whether the request already carries a terminal condition.
pub fn is_failed_or_finished(request: &ConvergenceRequest) -> bool {
    let finished = request.action.finished_condition_type();
    let failed = request.action.failed_condition_type();
    request
        .conditions()
        .iter()
        .any(|c| (c.type_ == finished || c.type_ == failed) && c.status == ConditionStatus::True)
}

/// Whether a condition of the given type is already present, whatever its
/// status.
pub fn has_condition(request: &ConvergenceRequest, type_: &str) -> bool {
    request.conditions().iter().any(|c| c.type_ == type_)
}

/// Compute the RFC 7386 merge patch turning `old` into `new`.
///
/// Objects are diffed key by key: changed keys carry their new value, removed
/// keys are set to `null`, identical keys are left out.  Anything that is not
/// an object on both sides (arrays included) is replaced as a whole.  Equal
/// documents yield an empty object.
pub fn create_merge_patch(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            let mut patch = Map::new();
            for (key, new_value) in new {
                match old.get(key) {
                    Some(old_value) if old_value == new_value => {}
                    Some(old_value @ Value::Object(_)) if new_value.is_object() => {
                        patch.insert(key.clone(), create_merge_patch(old_value, new_value));
                    }
                    _ => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old.keys() {
                if !new.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => new.clone(),
    }
}
