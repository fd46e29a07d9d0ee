//! Canonicalization of desired state against a reference state.
//!
//! Two directions exist. Desired-vs-initial fills fields the caller left
//! unset from the prior state and collapses equivalent representations onto
//! it. New-vs-desired runs after apply and collapses the freshly observed
//! state onto the desired representation wherever the two are equivalent,
//! so the verification diff only reports real divergence.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::diff::{Compare, compare};
use crate::model::Nested;

/// Merging behaviour for nested configuration objects.
pub trait Canonicalize: Sized + Clone {
    /// Merges `desired` with the prior state; `None` means no prior state.
    #[must_use]
    fn canonicalize_desired(desired: &Self, initial: Option<&Self>) -> Self;

    /// Merges freshly observed state onto `desired`.
    #[must_use]
    fn canonicalize_new(new: &Self, desired: &Self) -> Self;
}

/// Returns true if two strings denote the same value.
///
/// Surrounding whitespace is ignored, and a full resource URL matches its
/// trailing name (`.../zones/us-central1-a` matches `us-central1-a`).
#[must_use]
pub fn strings_equivalent(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a == b {
        return true;
    }
    if a.contains('/') || b.contains('/') {
        let last = |s: &'_ str| s.rsplit('/').next().unwrap_or(s).to_string();
        return !a.is_empty() && !b.is_empty() && last(a) == last(b);
    }
    false
}

/// Desired string against the initial string.
#[must_use]
pub fn desired_string(desired: &Option<String>, initial: &Option<String>) -> Option<String> {
    match (desired, initial) {
        (None, _) => initial.clone(),
        (Some(d), Some(i)) if strings_equivalent(d, i) => initial.clone(),
        (Some(d), _) if d.is_empty() => initial.clone(),
        (Some(_), _) => desired.clone(),
    }
}

/// Desired scalar against the initial scalar; zero and unset are interchangeable.
#[must_use]
pub fn desired_scalar<T>(desired: &Option<T>, initial: &Option<T>) -> Option<T>
where
    T: Clone + PartialEq + Default,
{
    let zero = T::default();
    let is_zero = |v: &Option<T>| v.as_ref().is_none_or(|v| *v == zero);
    if desired.is_none() || (is_zero(desired) && is_zero(initial)) {
        initial.clone()
    } else {
        desired.clone()
    }
}

/// Desired map against the initial map.
#[must_use]
pub fn desired_map(
    desired: &BTreeMap<String, String>,
    initial: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    if desired.is_empty() {
        initial.clone()
    } else {
        desired.clone()
    }
}

/// Desired scalar list against the initial list.
#[must_use]
pub fn desired_list<T: Clone>(desired: &[T], initial: &[T]) -> Vec<T> {
    if desired.is_empty() {
        initial.to_vec()
    } else {
        desired.to_vec()
    }
}

/// Desired string list against the initial list, element-wise equivalent.
#[must_use]
pub fn desired_string_list(desired: &[String], initial: &[String]) -> Vec<String> {
    if desired.is_empty() || string_lists_equivalent(desired, initial) {
        initial.to_vec()
    } else {
        desired.to_vec()
    }
}

/// Desired unordered string set against the initial set.
#[must_use]
pub fn desired_string_set(desired: &[String], initial: &[String]) -> Vec<String> {
    if desired.is_empty() || string_sets_equal(desired, initial) {
        initial.to_vec()
    } else {
        desired.to_vec()
    }
}

/// Desired free-form JSON payload against the initial payload.
#[must_use]
pub fn desired_json(desired: &Option<Value>, initial: &Option<Value>) -> Option<Value> {
    if desired.is_none() || json_equivalent(desired, initial) {
        initial.clone()
    } else {
        desired.clone()
    }
}

/// Desired nested object against the initial nested object.
#[must_use]
pub fn desired_nested<T: Canonicalize>(desired: &Nested<T>, initial: &Nested<T>) -> Nested<T> {
    match (desired, initial) {
        (Nested::Absent, _) => initial.clone(),
        (Nested::Empty, _) => Nested::Empty,
        (Nested::Value(d), Nested::Value(i)) => Nested::Value(T::canonicalize_desired(d, Some(i))),
        (Nested::Value(d), _) => Nested::Value(T::canonicalize_desired(d, None)),
    }
}

/// Desired nested object with no prior state at all.
#[must_use]
pub fn desired_nested_alone<T: Canonicalize>(desired: &Nested<T>) -> Nested<T> {
    match desired {
        Nested::Value(d) => Nested::Value(T::canonicalize_desired(d, None)),
        other => other.clone(),
    }
}

/// Desired list of nested objects against the initial list.
///
/// Lists of different length are canonicalized element-wise without a
/// reference.
#[must_use]
pub fn desired_nested_list<T: Canonicalize>(desired: &[T], initial: &[T]) -> Vec<T> {
    if desired.is_empty() {
        return initial.to_vec();
    }
    if desired.len() != initial.len() {
        return desired.iter().map(|d| T::canonicalize_desired(d, None)).collect();
    }
    desired
        .iter()
        .zip(initial)
        .map(|(d, i)| T::canonicalize_desired(d, Some(i)))
        .collect()
}

/// New string against desired: equivalent values keep the desired form.
#[must_use]
pub fn new_string(new: &Option<String>, desired: &Option<String>) -> Option<String> {
    match (new, desired) {
        (Some(n), Some(d)) if strings_equivalent(n, d) => desired.clone(),
        _ => new.clone(),
    }
}

/// New string list against desired: equivalent lists keep the desired form.
#[must_use]
pub fn new_string_list(new: &[String], desired: &[String]) -> Vec<String> {
    if string_lists_equivalent(new, desired) {
        desired.to_vec()
    } else {
        new.to_vec()
    }
}

/// New unordered string set against desired: equal sets keep the desired order.
#[must_use]
pub fn new_string_set(new: &[String], desired: &[String]) -> Vec<String> {
    if string_sets_equal(new, desired) {
        desired.to_vec()
    } else {
        new.to_vec()
    }
}

/// New free-form JSON payload against desired: equivalent payloads keep the desired form.
#[must_use]
pub fn new_json(new: &Option<Value>, desired: &Option<Value>) -> Option<Value> {
    if json_equivalent(new, desired) {
        desired.clone()
    } else {
        new.clone()
    }
}

/// Returns true if two payloads are equal once empty members are dropped.
#[must_use]
pub fn json_equivalent(a: &Option<Value>, b: &Option<Value>) -> bool {
    a.as_ref().and_then(prune_empty) == b.as_ref().and_then(prune_empty)
}

/// Drops `null`, `[]` and `{}` object members recursively.
///
/// The API omits empty repeated and message fields when echoing a payload.
/// Returns `None` if nothing is left. Array elements keep their positions.
#[must_use]
pub fn prune_empty(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| prune_empty(item).unwrap_or_else(|| item.clone()))
                .collect(),
        )),
        Value::Object(members) => {
            let members: Map<String, Value> = members
                .iter()
                .filter_map(|(key, member)| prune_empty(member).map(|m| (key.clone(), m)))
                .collect();
            (!members.is_empty()).then_some(Value::Object(members))
        }
        other => Some(other.clone()),
    }
}

/// New nested object against desired.
///
/// A nested object the server omitted stays explicitly empty when the
/// caller asked for it empty.
#[must_use]
pub fn new_nested<T: Canonicalize>(new: &Nested<T>, desired: &Nested<T>) -> Nested<T> {
    match (new, desired) {
        (_, Nested::Absent) => new.clone(),
        (Nested::Absent, Nested::Empty) | (Nested::Empty, Nested::Empty) => Nested::Empty,
        (Nested::Absent, Nested::Value(_)) => Nested::Absent,
        (Nested::Value(n), Nested::Value(d)) => Nested::Value(T::canonicalize_new(n, d)),
        (Nested::Empty | Nested::Value(_), _) => new.clone(),
    }
}

/// New ordered list against desired; lists of different length keep the new value.
#[must_use]
pub fn new_nested_list<T: Canonicalize>(new: &[T], desired: &[T]) -> Vec<T> {
    if new.len() != desired.len() {
        return new.to_vec();
    }
    new.iter()
        .zip(desired)
        .map(|(n, d)| T::canonicalize_new(n, d))
        .collect()
}

/// New unordered set against desired.
///
/// Desired elements that match an observed element keep desired order;
/// observed elements left unmatched are appended.
#[must_use]
pub fn new_nested_set<T: Canonicalize + Compare>(new: &[T], desired: &[T]) -> Vec<T> {
    let mut remaining: Vec<&T> = new.iter().collect();
    let mut items = Vec::with_capacity(new.len());
    for d in desired {
        if let Some(index) = remaining.iter().position(|n| compare(d, *n).is_empty()) {
            let matched = remaining.remove(index);
            items.push(T::canonicalize_new(matched, d));
        }
    }
    items.extend(remaining.into_iter().cloned());
    items
}

fn string_sets_equal(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<&str> = a.iter().map(|s| s.trim()).collect();
    let mut b: Vec<&str> = b.iter().map(|s| s.trim()).collect();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

fn string_lists_equivalent(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| strings_equivalent(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::diff::{Differ, FieldRule};
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Default, Serialize)]
    struct Action {
        #[serde(skip_serializing_if = "Option::is_none")]
        executable_file: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        execution_timeout: Option<String>,
    }

    impl Canonicalize for Action {
        fn canonicalize_desired(desired: &Self, initial: Option<&Self>) -> Self {
            let Some(initial) = initial else {
                return desired.clone();
            };
            Self {
                executable_file: desired_string(&desired.executable_file, &initial.executable_file),
                execution_timeout: desired_string(&desired.execution_timeout, &initial.execution_timeout),
            }
        }

        fn canonicalize_new(new: &Self, desired: &Self) -> Self {
            Self {
                executable_file: new_string(&new.executable_file, &desired.executable_file),
                execution_timeout: new_string(&new.execution_timeout, &desired.execution_timeout),
            }
        }
    }

    impl Compare for Action {
        fn compare(desired: &Self, actual: &Self, differ: &mut Differ) {
            differ.string("executableFile", &desired.executable_file, &actual.executable_file, FieldRule::inherit());
            differ.string(
                "executionTimeout",
                &desired.execution_timeout,
                &actual.execution_timeout,
                FieldRule::inherit().server_default(),
            );
        }
    }

    fn action(file: &str, timeout: Option<&str>) -> Action {
        Action {
            executable_file: Some(file.to_string()),
            execution_timeout: timeout.map(str::to_string),
        }
    }

    #[test]
    fn test_strings_equivalent() {
        assert!(strings_equivalent(" a ", "a"));
        assert!(strings_equivalent(
            "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
            "us-central1-a"
        ));
        assert!(!strings_equivalent("a", "b"));
        assert!(!strings_equivalent("", "x/"));
    }

    #[test]
    fn test_desired_string_inherits_and_collapses() {
        let initial = Some(String::from("projects/p/zones/z1"));
        assert_eq!(desired_string(&None, &initial), initial);
        assert_eq!(desired_string(&Some(String::from("z1")), &initial), initial);
        assert_eq!(
            desired_string(&Some(String::from("z2")), &initial),
            Some(String::from("z2"))
        );
    }

    #[test]
    fn test_desired_scalar_zero_collapses() {
        assert_eq!(desired_scalar(&Some(0_i64), &None), None);
        assert_eq!(desired_scalar(&None, &Some(3_i64)), Some(3));
        assert_eq!(desired_scalar(&Some(5_i64), &Some(3)), Some(5));
        assert_eq!(desired_scalar(&Some(0_i64), &Some(3)), Some(0));
    }

    #[test]
    fn test_desired_nested_preserves_explicit_empty() {
        let initial = Nested::value(action("gs://b/init.sh", None));
        assert_eq!(desired_nested(&Nested::<Action>::Empty, &initial), Nested::Empty);
        assert_eq!(desired_nested(&Nested::Absent, &initial), initial);
    }

    #[test]
    fn test_new_nested_keeps_empty_when_server_omits() {
        assert_eq!(new_nested(&Nested::<Action>::Absent, &Nested::Empty), Nested::Empty);
        assert_eq!(
            new_nested(&Nested::<Action>::Absent, &Nested::value(action("x", None))),
            Nested::Absent
        );
    }

    #[test]
    fn test_desired_nested_list_length_mismatch() {
        let desired = vec![action("a", None), action("b", None)];
        let initial = vec![action("a", Some("600s"))];
        assert_eq!(desired_nested_list(&desired, &initial), desired);

        let initial = vec![action("a", Some("600s")), action("b", None)];
        let merged = desired_nested_list(&desired, &initial);
        assert_eq!(merged[0].execution_timeout.as_deref(), Some("600s"));
    }

    #[test]
    fn test_new_nested_set_matches_out_of_order() {
        let desired = vec![action("a", None), action("b", None)];
        let new = vec![
            action("c", None),
            action("b", Some("600s")),
            action("a", Some("600s")),
        ];
        let merged = new_nested_set(&new, &desired);
        let files: Vec<_> = merged
            .iter()
            .filter_map(|a| a.executable_file.as_deref())
            .collect();
        assert_eq!(files, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_string_set_keeps_desired_order() {
        let desired = vec![String::from("b"), String::from("a")];
        let new = vec![String::from("a"), String::from("b")];
        assert_eq!(new_string_set(&new, &desired), desired);
        assert_eq!(desired_string_set(&desired, &new), new);
    }

    #[test]
    fn test_json_ignores_members_the_server_omits() {
        let desired = Some(serde_json::json!({"mainJarFileUri": "gs://b/x.jar", "args": [], "properties": {}}));
        let echoed = Some(serde_json::json!({"mainJarFileUri": "gs://b/x.jar"}));

        assert!(json_equivalent(&desired, &echoed));
        assert_eq!(new_json(&echoed, &desired), desired);
        assert_eq!(desired_json(&desired, &echoed), echoed);
        assert_eq!(desired_json(&None, &echoed), echoed);

        let changed = Some(serde_json::json!({"mainJarFileUri": "gs://b/y.jar"}));
        assert_eq!(new_json(&changed, &desired), changed);
        assert_eq!(desired_json(&changed, &echoed), changed);
    }

    #[test]
    fn test_prune_empty_keeps_array_positions() {
        let value = serde_json::json!({"args": ["", {}], "jarFileUris": null});
        assert_eq!(prune_empty(&value), Some(serde_json::json!({"args": ["", {}]})));
        assert_eq!(prune_empty(&serde_json::json!({"a": {"b": []}})), None);
    }

    #[test]
    fn test_canonicalize_fixed_point() {
        let value = action("gs://b/init.sh", Some("600s"));
        assert_eq!(Action::canonicalize_desired(&value, Some(&value)), value);
        assert_eq!(Action::canonicalize_new(&value, &value), value);
    }
}
