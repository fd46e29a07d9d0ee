//! Wire codec between typed resources and Dataproc JSON.
//!
//! Field names and the empty-object sentinel are handled by the serde
//! derives on the model types; this module adds what the derives cannot
//! express: stripping output-only paths on expand, stamping identity on
//! flatten, and building partial update bodies.

use serde_json::{Map, Value};

use super::resource::{Identity, Resource, UpdateBody, UpdateOperation};
use crate::error::{ApiError, DataprocError, Result};
use crate::planner::FieldDiff;

/// Encodes a resource as a create request body.
///
/// # Errors
///
/// Returns an error if the resource does not encode to a JSON object.
pub fn expand<R: Resource>(resource: &R) -> Result<Map<String, Value>> {
    let mut body = to_object(resource)?;
    for path in R::OUTPUT_ONLY {
        remove_path(&mut body, path);
    }
    Ok(body)
}

/// Encodes a resource as a JSON object, output-only fields included.
///
/// # Errors
///
/// Returns an error if the resource does not encode to a JSON object.
pub fn to_object<R: Resource>(resource: &R) -> Result<Map<String, Value>> {
    match serde_json::to_value(resource) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DataprocError::internal(format!(
            "{} encoded to a non-object: {other}",
            R::KIND
        ))),
        Err(e) => Err(DataprocError::internal(format!("Failed to encode {}: {e}", R::KIND))),
    }
}

/// Decodes a resource from a response body.
///
/// Every identity part set in `context` overrides what the payload carries;
/// unset parts keep the decoded value.
///
/// # Errors
///
/// Returns an error if the payload does not match the resource schema.
pub fn flatten<R: Resource>(value: Value, context: &Identity) -> Result<R> {
    let mut resource: R = serde_json::from_value(value).map_err(|e| {
        ApiError::invalid_response(format!("Failed to decode {}: {e}", R::KIND))
    })?;
    let decoded = resource.identity();
    resource.set_identity(&Identity {
        project: context.project.clone().or(decoded.project),
        location: context.location.clone().or(decoded.location),
        name: context.name.clone().or(decoded.name),
    });
    Ok(resource)
}

/// An update request body and its optional field mask.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Request body.
    pub body: Map<String, Value>,
    /// Comma-separated `updateMask`, for masked updates.
    pub update_mask: Option<String>,
}

/// Builds the body of `operation` from the desired resource and the diffs it fixes.
///
/// # Errors
///
/// Returns an error if the desired resource cannot be encoded.
pub fn update_request<R: Resource>(
    desired: &R,
    operation: &UpdateOperation,
    diffs: &[FieldDiff],
) -> Result<UpdateRequest> {
    let source = expand(desired)?;
    let mut body = Map::new();
    let mut mask: Vec<&'static str> = Vec::new();

    for diff in diffs {
        match operation.body {
            UpdateBody::TopLevel => {
                let key = diff.top_level_field();
                if let Some(value) = source.get(key) {
                    body.insert(key.to_string(), value.clone());
                }
            }
            UpdateBody::Masked => {
                copy_path(&source, &mut body, &diff.path);
                if let Some(entry) = R::update_mask_path(&diff.path) {
                    if !mask.contains(&entry) {
                        mask.push(entry);
                    }
                }
            }
        }
    }

    if let Some(id_key) = R::ID_KEY {
        if let Some(id) = source.get(id_key) {
            body.insert(id_key.to_string(), id.clone());
        }
    }

    Ok(UpdateRequest {
        body,
        update_mask: (operation.body == UpdateBody::Masked).then(|| mask.join(",")),
    })
}

/// Fills keys absent from `target` with the values `source` carries.
///
/// Nested objects present on both sides are merged recursively; values
/// already in `target` always win.
pub fn merge_missing(target: &mut Value, source: &Value) {
    let (Value::Object(target), Value::Object(source)) = (target, source) else {
        return;
    };
    for (key, value) in source {
        match target.get_mut(key) {
            None | Some(Value::Null) => {
                target.insert(key.clone(), value.clone());
            }
            Some(existing) => merge_missing(existing, value),
        }
    }
}

/// Removes a dotted path from a JSON object; list elements are descended into.
fn remove_path(map: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            map.remove(path);
        }
        Some((head, rest)) => match map.get_mut(head) {
            Some(Value::Object(inner)) => remove_path(inner, rest),
            Some(Value::Array(items)) => {
                for item in items {
                    if let Value::Object(inner) = item {
                        remove_path(inner, rest);
                    }
                }
            }
            _ => {}
        },
    }
}

/// Copies the value at a dotted path from `source` into `target`, creating parents.
fn copy_path(source: &Map<String, Value>, target: &mut Map<String, Value>, path: &str) {
    let path = path.split('[').next().unwrap_or(path);
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let Some(value) = source.get(head) else {
        return;
    };
    match (rest, value) {
        (Some(rest), Value::Object(inner)) => {
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = entry {
                copy_path(inner, child, rest);
            }
        }
        _ => {
            target.insert(head.to_string(), value.clone());
        }
    }
}
