//! Field-level diffing between canonical desired and actual resources.
//!
//! Every field is compared under a [`FieldRule`] that decides whether a
//! difference is ignored, forces recreation, or is fixed in place by a named
//! update operation. Nested objects are compared recursively through the
//! [`Compare`] trait; their leaf fields inherit the parent's remediation
//! unless they declare their own.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::canonical::prune_empty;
use crate::model::Nested;

/// How a difference must be remediated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "operation", rename_all = "snake_case")]
pub enum Remediation {
    /// The resource has to be destroyed and created again.
    Recreate,
    /// The named update operation fixes the difference in place.
    Update(&'static str),
}

impl Remediation {
    /// Returns the update operation name, if this is an in-place update.
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Recreate => None,
            Self::Update(name) => Some(name),
        }
    }
}

impl fmt::Display for Remediation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recreate => write!(f, "requires recreate"),
            Self::Update(name) => write!(f, "update via {name}"),
        }
    }
}

/// One field-level discrepancy between desired and actual state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    /// Dotted wire path of the field, with `[i]` for list elements.
    pub path: String,
    /// Desired value, if set.
    pub desired: Option<Value>,
    /// Actual value, if set.
    pub actual: Option<Value>,
    /// Required remediation.
    pub remediation: Remediation,
}

impl FieldDiff {
    /// Returns the first segment of the path (the top-level wire key).
    #[must_use]
    pub fn top_level_field(&self) -> &str {
        self.path
            .split(['.', '['])
            .next()
            .unwrap_or(self.path.as_str())
    }

    /// Returns true if this diff forces recreation.
    #[must_use]
    pub const fn requires_recreate(&self) -> bool {
        matches!(self.remediation, Remediation::Recreate)
    }
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<Value>| v.as_ref().map_or_else(|| String::from("<unset>"), Value::to_string);
        write!(
            f,
            "{}: {} -> {} ({})",
            self.path,
            show(&self.actual),
            show(&self.desired),
            self.remediation
        )
    }
}

/// Per-field diff behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    remediation: Option<Remediation>,
    output_only: bool,
    server_default: bool,
    ignored: bool,
    ignored_prefix: Option<&'static str>,
}

impl FieldRule {
    /// A field whose change forces recreation.
    #[must_use]
    pub const fn recreate() -> Self {
        Self::with(Some(Remediation::Recreate))
    }

    /// A field whose change is fixed by the named update operation.
    #[must_use]
    pub const fn triggers(operation: &'static str) -> Self {
        Self::with(Some(Remediation::Update(operation)))
    }

    /// A field that takes the remediation of its enclosing object.
    #[must_use]
    pub const fn inherit() -> Self {
        Self::with(None)
    }

    const fn with(remediation: Option<Remediation>) -> Self {
        Self {
            remediation,
            output_only: false,
            server_default: false,
            ignored: false,
            ignored_prefix: None,
        }
    }

    /// Marks the field as populated only by the server.
    #[must_use]
    pub const fn output_only(mut self) -> Self {
        self.output_only = true;
        self
    }

    /// Marks the field as defaulted by the server when left unset.
    #[must_use]
    pub const fn server_default(mut self) -> Self {
        self.server_default = true;
        self
    }

    /// Marks the field as never diffed.
    #[must_use]
    pub const fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Ignores map keys starting with `prefix`.
    #[must_use]
    pub const fn ignore_prefix(mut self, prefix: &'static str) -> Self {
        self.ignored_prefix = Some(prefix);
        self
    }

    const fn skipped(&self) -> bool {
        self.output_only || self.ignored
    }
}

/// Recursive comparison for nested configuration objects.
pub trait Compare {
    /// Records every difference between `desired` and `actual` into `differ`.
    fn compare(desired: &Self, actual: &Self, differ: &mut Differ);
}

/// Compares two nested values, returning their differences.
///
/// Paths are relative to the compared value and leaf fields without an
/// explicit rule are tagged [`Remediation::Recreate`].
#[must_use]
pub fn compare<T: Compare>(desired: &T, actual: &T) -> Vec<FieldDiff> {
    let mut differ = Differ::new();
    T::compare(desired, actual, &mut differ);
    differ.finish()
}

/// Accumulates field diffs under a path prefix.
#[derive(Debug)]
pub struct Differ {
    prefix: String,
    inherited: Remediation,
    diffs: Vec<FieldDiff>,
}

impl Default for Differ {
    fn default() -> Self {
        Self::new()
    }
}

impl Differ {
    /// Creates a root differ; unruled leaf fields require recreation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            prefix: String::new(),
            inherited: Remediation::Recreate,
            diffs: Vec::new(),
        }
    }

    /// Returns the collected diffs in field declaration order.
    #[must_use]
    pub fn finish(self) -> Vec<FieldDiff> {
        self.diffs
    }

    fn path(&self, field: &str) -> String {
        if self.prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{field}", self.prefix)
        }
    }

    fn push<D: Serialize + ?Sized, A: Serialize + ?Sized>(
        &mut self,
        path: String,
        rule: FieldRule,
        desired: Option<&D>,
        actual: Option<&A>,
    ) {
        self.diffs.push(FieldDiff {
            path,
            desired: desired.and_then(|v| serde_json::to_value(v).ok()),
            actual: actual.and_then(|v| serde_json::to_value(v).ok()),
            remediation: rule.remediation.unwrap_or(self.inherited),
        });
    }

    fn child(&self, path: String, rule: FieldRule) -> Self {
        Self {
            prefix: path,
            inherited: rule.remediation.unwrap_or(self.inherited),
            diffs: Vec::new(),
        }
    }

    /// Compares an optional scalar; a zero value counts as unset.
    pub fn scalar<T>(&mut self, field: &str, desired: &Option<T>, actual: &Option<T>, rule: FieldRule)
    where
        T: Serialize + PartialEq + Default,
    {
        if rule.skipped() {
            return;
        }
        let zero = T::default();
        let des = desired.as_ref().filter(|v| **v != zero);
        let act = actual.as_ref().filter(|v| **v != zero);
        let differs = match (des, act) {
            (None, None) => false,
            (None, Some(_)) => !rule.server_default,
            (Some(_), None) => true,
            (Some(d), Some(a)) => d != a,
        };
        if differs {
            self.push(self.path(field), rule, desired.as_ref(), actual.as_ref());
        }
    }

    /// Compares free-form JSON payloads, ignoring empty members.
    pub fn json(&mut self, field: &str, desired: &Option<Value>, actual: &Option<Value>, rule: FieldRule) {
        if rule.skipped() {
            return;
        }
        let des = desired.as_ref().and_then(prune_empty);
        let act = actual.as_ref().and_then(prune_empty);
        let differs = match (&des, &act) {
            (None, None) => false,
            (None, Some(_)) => !rule.server_default,
            (Some(_), None) => true,
            (Some(d), Some(a)) => d != a,
        };
        if differs {
            self.push(self.path(field), rule, desired.as_ref(), actual.as_ref());
        }
    }

    /// Compares an optional string exactly, after canonicalization.
    pub fn string(
        &mut self,
        field: &str,
        desired: &Option<String>,
        actual: &Option<String>,
        rule: FieldRule,
    ) {
        self.scalar(field, desired, actual, rule);
    }

    /// Compares an ordered list of scalars as a unit.
    pub fn list<T: Serialize + PartialEq>(
        &mut self,
        field: &str,
        desired: &[T],
        actual: &[T],
        rule: FieldRule,
    ) {
        if rule.skipped() || (desired.is_empty() && (actual.is_empty() || rule.server_default)) {
            return;
        }
        if desired != actual {
            self.push(self.path(field), rule, Some(desired), Some(actual));
        }
    }

    /// Compares a list of strings ignoring order.
    pub fn string_set(&mut self, field: &str, desired: &[String], actual: &[String], rule: FieldRule) {
        if rule.skipped() || (desired.is_empty() && (actual.is_empty() || rule.server_default)) {
            return;
        }
        let mut des: Vec<&String> = desired.iter().collect();
        let mut act: Vec<&String> = actual.iter().collect();
        des.sort();
        act.sort();
        if des != act {
            self.push(self.path(field), rule, Some(desired), Some(actual));
        }
    }

    /// Compares a string map as a unit.
    pub fn map(
        &mut self,
        field: &str,
        desired: &BTreeMap<String, String>,
        actual: &BTreeMap<String, String>,
        rule: FieldRule,
    ) {
        let (desired, actual) = match rule.ignored_prefix {
            Some(prefix) => (without_prefix(desired, prefix), without_prefix(actual, prefix)),
            None => (desired.clone(), actual.clone()),
        };
        if rule.skipped() || (desired.is_empty() && (actual.is_empty() || rule.server_default)) {
            return;
        }
        if desired != actual {
            self.push(self.path(field), rule, Some(&desired), Some(&actual));
        }
    }

    /// Compares a nested object recursively.
    ///
    /// An explicitly empty desired object differs from any populated actual
    /// object; an absent desired object never differs.
    pub fn nested<T>(&mut self, field: &str, desired: &Nested<T>, actual: &Nested<T>, rule: FieldRule)
    where
        T: Compare + Serialize + Default,
    {
        if rule.skipped() {
            return;
        }
        let path = self.path(field);
        match (desired, actual) {
            (Nested::Absent, _) => {}
            (Nested::Empty, _) => {
                if !is_blank(actual) {
                    self.push(path, rule, Some(desired), Some(actual));
                }
            }
            (Nested::Value(des), Nested::Value(act)) => {
                let mut child = self.child(path, rule);
                T::compare(des, act, &mut child);
                self.diffs.extend(child.diffs);
            }
            (Nested::Value(des), Nested::Absent | Nested::Empty) => {
                let mut child = self.child(path, rule);
                T::compare(des, &T::default(), &mut child);
                self.diffs.extend(child.diffs);
            }
        }
    }

    /// Compares an ordered list of nested objects element by element.
    pub fn nested_list<T>(&mut self, field: &str, desired: &[T], actual: &[T], rule: FieldRule)
    where
        T: Compare + Serialize,
    {
        if rule.skipped() || (desired.is_empty() && (actual.is_empty() || rule.server_default)) {
            return;
        }
        let path = self.path(field);
        if desired.len() != actual.len() {
            self.push(path, rule, Some(desired), Some(actual));
            return;
        }
        for (index, (des, act)) in desired.iter().zip(actual).enumerate() {
            let mut child = self.child(format!("{path}[{index}]"), rule);
            T::compare(des, act, &mut child);
            self.diffs.extend(child.diffs);
        }
    }

    /// Compares a list of nested objects ignoring order.
    ///
    /// Each desired element must match a distinct actual element with no
    /// differences; any mismatch is reported once for the whole field.
    pub fn nested_set<T>(&mut self, field: &str, desired: &[T], actual: &[T], rule: FieldRule)
    where
        T: Compare + Serialize,
    {
        if rule.skipped() || (desired.is_empty() && (actual.is_empty() || rule.server_default)) {
            return;
        }
        if !sets_match(desired, actual) {
            self.push(self.path(field), rule, Some(desired), Some(actual));
        }
    }
}

/// Returns true if every desired element matches a distinct actual element.
pub(crate) fn sets_match<T: Compare>(desired: &[T], actual: &[T]) -> bool {
    if desired.len() != actual.len() {
        return false;
    }
    let mut unmatched: Vec<&T> = actual.iter().collect();
    for des in desired {
        match unmatched.iter().position(|act| compare(des, *act).is_empty()) {
            Some(index) => {
                unmatched.remove(index);
            }
            None => return false,
        }
    }
    true
}

fn without_prefix(map: &BTreeMap<String, String>, prefix: &str) -> BTreeMap<String, String> {
    map.iter()
        .filter(|(key, _)| !key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Returns true if the value is absent or encodes to an empty object.
fn is_blank<T: Serialize>(value: &Nested<T>) -> bool {
    match value {
        Nested::Absent | Nested::Empty => true,
        Nested::Value(v) => matches!(
            serde_json::to_value(v),
            Ok(Value::Object(map)) if map.is_empty()
        ),
    }
}
