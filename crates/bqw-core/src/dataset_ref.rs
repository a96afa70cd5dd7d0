//! Strongly-typed warehouse identifiers.

use crate::error::{CoreError, CoreResult};
use crate::newtype_string::define_validated_name;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_NAME_LEN: usize = 1024;

fn validate_project(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_string());
    }
    match s
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | ':')))
    {
        Some(c) => Err(format!("unexpected character '{}'", c)),
        None => Ok(()),
    }
}

fn validate_dataset(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_string());
    }
    if s.len() > MAX_NAME_LEN {
        return Err(format!("longer than {} characters", MAX_NAME_LEN));
    }
    match s.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        Some(c) => Err(format!(
            "unexpected character '{}' (letters, digits and underscores only)",
            c
        )),
        None => Ok(()),
    }
}

fn validate_table(s: &str) -> Result<(), String> {
    if s.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    if s.len() > MAX_NAME_LEN {
        return Err(format!("longer than {} characters", MAX_NAME_LEN));
    }
    match s.chars().find(|c| matches!(c, '.' | '`' | '"') || c.is_control()) {
        Some(c) => Err(format!("unexpected character {:?}", c)),
        None => Ok(()),
    }
}

define_validated_name! {
    /// A warehouse project identifier, e.g. `my-project` or `example.com:my-project`.
    pub struct ProjectId;
    kind = "project";
    validate = validate_project;
}

define_validated_name! {
    /// The unqualified name of a dataset.
    pub struct DatasetName;
    kind = "dataset";
    validate = validate_dataset;
}

define_validated_name! {
    /// A table or view name inside a dataset.
    pub struct TableName;
    kind = "table";
    validate = validate_table;
}

/// A dataset, optionally qualified with its project.
///
/// Written `dataset` or `project.dataset`. The project is everything before
/// the last `.`, so domain-scoped projects (`example.com:proj.sales`) parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetRef {
    pub project: Option<ProjectId>,
    pub dataset: DatasetName,
}

impl DatasetRef {
    pub fn new(project: Option<ProjectId>, dataset: DatasetName) -> Self {
        Self { project, dataset }
    }

    /// Parse `dataset` or `project.dataset`.
    ///
    /// Bare names are qualified with `default_project` when one is given.
    pub fn parse(input: &str, default_project: Option<&ProjectId>) -> CoreResult<Self> {
        let input = input.trim();
        match input.rsplit_once('.') {
            Some((project, dataset)) => Ok(Self {
                project: Some(ProjectId::try_new(project)?),
                dataset: DatasetName::try_new(dataset)?,
            }),
            None => Ok(Self {
                project: default_project.cloned(),
                dataset: DatasetName::try_new(input)?,
            }),
        }
    }

    /// Parse a name that must end up fully qualified.
    pub fn parse_qualified(input: &str, default_project: Option<&ProjectId>) -> CoreResult<Self> {
        let parsed = Self::parse(input, default_project)?;
        if parsed.project.is_none() {
            return Err(CoreError::InvalidName {
                kind: "dataset",
                name: input.to_string(),
                reason: "no project given and no default project configured".to_string(),
            });
        }
        Ok(parsed)
    }

    /// Return the project, falling back to `default` when unqualified.
    pub fn project_or<'a>(&'a self, default: &'a ProjectId) -> &'a ProjectId {
        self.project.as_ref().unwrap_or(default)
    }

    /// Fully-qualified name of a table inside this dataset.
    pub fn table_path(&self, table: &TableName) -> String {
        format!("{}.{}", self, table)
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(p) => write!(f, "{}.{}", p, self.dataset),
            None => f.write_str(self.dataset.as_str()),
        }
    }
}

#[cfg(test)]
#[path = "dataset_ref_test.rs"]
mod tests;
