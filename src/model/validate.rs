//! Required-field validation for resources.

use crate::error::ConfigError;

use super::nested::Nested;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted wire path of the field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

/// Collects validation failures for one resource.
#[derive(Debug)]
pub struct Validator {
    kind: &'static str,
    prefix: String,
    issues: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a validator for the given resource kind.
    #[must_use]
    pub const fn new(kind: &'static str) -> Self {
        Self {
            kind,
            prefix: String::new(),
            issues: Vec::new(),
        }
    }

    fn path(&self, field: &str) -> String {
        if self.prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{field}", self.prefix)
        }
    }

    /// Records a failure when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.issues.push(ValidationIssue {
                field: self.path(field),
                message: message.into(),
            });
        }
    }

    /// Requires a non-empty string.
    pub fn require_string(&mut self, field: &str, value: Option<&String>) {
        self.check(
            value.is_some_and(|v| !v.trim().is_empty()),
            field,
            "required field is not set",
        );
    }

    /// Requires a scalar to be set.
    pub fn require<T>(&mut self, field: &str, value: Option<&T>) {
        self.check(value.is_some(), field, "required field is not set");
    }

    /// Requires a nested object to be present; an explicit `{}` counts.
    pub fn require_nested<T>(&mut self, field: &str, value: &Nested<T>) {
        self.check(!value.is_absent(), field, "required field is not set");
    }

    /// Validates a populated nested object under `field`.
    pub fn nested<T>(&mut self, field: &str, value: &Nested<T>, f: impl FnOnce(&mut Self, &T)) {
        if let Nested::Value(inner) = value {
            let path = self.path(field);
            let saved = std::mem::replace(&mut self.prefix, path);
            f(self, inner);
            self.prefix = saved;
        }
    }

    /// Validates each element of a list under `field[i]`.
    pub fn each<T>(&mut self, field: &str, values: &[T], mut f: impl FnMut(&mut Self, &T)) {
        for (index, value) in values.iter().enumerate() {
            let path = format!("{}[{index}]", self.path(field));
            let saved = std::mem::replace(&mut self.prefix, path);
            f(self, value);
            self.prefix = saved;
        }
    }

    /// Returns every failure found.
    #[must_use]
    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    /// Fails with the first failure found, if any.
    ///
    /// # Errors
    ///
    /// Returns a validation error for the first recorded issue.
    pub fn finish(self) -> Result<(), ConfigError> {
        match self.issues.into_iter().next() {
            None => Ok(()),
            Some(issue) => Err(ConfigError::validation(self.kind, issue.field, issue.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Group {
        max_instances: Option<i64>,
    }

    #[test]
    fn test_nested_paths() {
        let mut validator = Validator::new("AutoscalingPolicy");
        validator.require_string("id", Some(&String::from("p1")));
        validator.nested("workerConfig", &Nested::value(Group::default()), |v, group| {
            v.require("maxInstances", group.max_instances.as_ref());
        });
        let issues = validator.into_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "workerConfig.maxInstances");
    }

    #[test]
    fn test_finish_reports_first_issue() {
        let mut validator = Validator::new("Cluster");
        validator.require_string("clusterName", None);
        validator.require_nested::<Group>("config", &Nested::Absent);
        let err = validator.finish().unwrap_err();
        assert!(err.to_string().contains("'clusterName'"));
    }

    #[test]
    fn test_each_indexes_paths() {
        let mut validator = Validator::new("WorkflowTemplate");
        let jobs = vec![Some(String::from("a")), None];
        validator.each("jobs", &jobs, |v, step| v.require_string("stepId", step.as_ref()));
        let issues = validator.into_issues();
        assert_eq!(issues[0].field, "jobs[1].stepId");
    }
}
