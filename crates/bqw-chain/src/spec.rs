//! Chain input validation

use crate::error::ChainError;
use bqw_core::{DatasetRef, ProjectId, TableName};
use std::collections::{BTreeSet, HashMap};

/// A validated chain request.
///
/// Holds at least two distinct datasets in chain order, an optional table
/// allow-list, the `force` flag, and table exclusion patterns.
#[derive(Debug, Clone)]
pub struct ChainSpec {
    datasets: Vec<DatasetRef>,
    allow_list: Option<BTreeSet<TableName>>,
    force: bool,
    exclusions: Vec<glob::Pattern>,
}

impl ChainSpec {
    pub fn new(
        datasets: Vec<DatasetRef>,
        allow_list: Option<BTreeSet<TableName>>,
        force: bool,
    ) -> Result<Self, ChainError> {
        if datasets.len() < 2 {
            return Err(ChainError::invalid(format!(
                "a chain needs at least two datasets, got {}",
                datasets.len()
            )));
        }

        reject_duplicates(&datasets, DatasetRef::clone)?;

        if allow_list.as_ref().is_some_and(|tables| tables.is_empty()) {
            return Err(ChainError::invalid("the table allow-list is empty"));
        }

        Ok(Self {
            datasets,
            allow_list,
            force,
            exclusions: Vec::new(),
        })
    }

    /// Parse dataset identifiers as typed on the command line.
    ///
    /// Bare names are qualified with `default_project` when one is given.
    pub fn parse(
        names: &[String],
        default_project: Option<&ProjectId>,
        allow_list: Option<BTreeSet<TableName>>,
        force: bool,
    ) -> Result<Self, ChainError> {
        let datasets = names
            .iter()
            .map(|name| {
                DatasetRef::parse(name, default_project)
                    .map_err(|e| ChainError::invalid(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(datasets, allow_list, force)
    }

    /// Attach glob patterns of table names that must never be chained.
    pub fn with_exclusions(mut self, patterns: &[String]) -> Result<Self, ChainError> {
        self.exclusions = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| {
                    ChainError::invalid(format!("bad exclusion pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self)
    }

    pub fn datasets(&self) -> &[DatasetRef] {
        &self.datasets
    }

    /// The dataset whose tables are chained.
    pub fn base(&self) -> &DatasetRef {
        &self.datasets[0]
    }

    /// Consecutive `(hop, source, target)` pairs, starting at hop 1.
    pub fn hops(&self) -> impl Iterator<Item = (usize, &DatasetRef, &DatasetRef)> {
        self.datasets
            .windows(2)
            .enumerate()
            .map(|(i, pair)| (i + 1, &pair[0], &pair[1]))
    }

    pub fn allow_list(&self) -> Option<&BTreeSet<TableName>> {
        self.allow_list.as_ref()
    }

    pub fn force(&self) -> bool {
        self.force
    }

    /// The first exclusion pattern matching `table`, if any.
    pub fn exclusion_for(&self, table: &TableName) -> Option<&str> {
        self.exclusions
            .iter()
            .find(|p| p.matches(table.as_str()))
            .map(|p| p.as_str())
    }

    /// Reject chains that name one dataset twice under different spellings.
    ///
    /// `identity` maps a ref to the dataset a backend really addresses, e.g.
    /// `raw` and `acme.raw` are the same schema on a backend without projects.
    pub fn ensure_distinct<F>(&self, identity: F) -> Result<(), ChainError>
    where
        F: Fn(&DatasetRef) -> DatasetRef,
    {
        reject_duplicates(&self.datasets, identity)
    }

    /// Names of datasets that carry no project.
    pub fn unqualified(&self) -> impl Iterator<Item = &DatasetRef> {
        self.datasets.iter().filter(|d| d.project.is_none())
    }
}

fn reject_duplicates<F>(datasets: &[DatasetRef], identity: F) -> Result<(), ChainError>
where
    F: Fn(&DatasetRef) -> DatasetRef,
{
    let mut seen: HashMap<DatasetRef, &DatasetRef> = HashMap::new();
    for dataset in datasets {
        if let Some(first) = seen.insert(identity(dataset), dataset) {
            let reason = if first == dataset {
                format!("dataset {} appears more than once", dataset)
            } else {
                format!("datasets {} and {} are the same dataset", first, dataset)
            };
            return Err(ChainError::invalid(reason));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_and_hops() {
        let spec =
            ChainSpec::parse(&names(&["raw", "staging", "mart"]), None, None, false).unwrap();
        let hops: Vec<(usize, String, String)> = spec
            .hops()
            .map(|(i, s, t)| (i, s.to_string(), t.to_string()))
            .collect();
        assert_eq!(
            hops,
            vec![
                (1, "raw".to_string(), "staging".to_string()),
                (2, "staging".to_string(), "mart".to_string()),
            ]
        );
        assert_eq!(spec.base().to_string(), "raw");
    }

    #[test]
    fn test_default_project_applied() {
        let project = ProjectId::try_new("acme").unwrap();
        let spec = ChainSpec::parse(
            &names(&["raw", "other.staging"]),
            Some(&project),
            None,
            false,
        )
        .unwrap();
        assert_eq!(spec.datasets()[0].to_string(), "acme.raw");
        assert_eq!(spec.datasets()[1].to_string(), "other.staging");
        assert_eq!(spec.unqualified().count(), 0);
    }

    #[test]
    fn test_single_dataset_rejected() {
        let err = ChainSpec::parse(&names(&["raw"]), None, None, false).unwrap_err();
        assert!(matches!(
            err,
            ChainError::InvalidChainSpec { ref reason } if reason.contains("at least two")
        ));
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = ChainSpec::parse(&names(&["raw", "staging", "raw"]), None, None, false)
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::InvalidChainSpec { ref reason } if reason.contains("more than once")
        ));
    }

    #[test]
    fn test_duplicates_detected_after_qualification() {
        let project = ProjectId::try_new("acme").unwrap();
        let err = ChainSpec::parse(&names(&["raw", "acme.raw"]), Some(&project), None, false)
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidChainSpec { .. }));
    }

    #[test]
    fn test_distinct_under_backend_identity() {
        let spec = ChainSpec::parse(&names(&["raw", "acme.raw"]), None, None, false).unwrap();
        assert!(spec.ensure_distinct(DatasetRef::clone).is_ok());

        let project_blind = |d: &DatasetRef| DatasetRef::new(None, d.dataset.clone());
        let err = spec.ensure_distinct(project_blind).unwrap_err();
        assert!(matches!(
            err,
            ChainError::InvalidChainSpec { ref reason }
                if reason.contains("raw and acme.raw are the same dataset")
        ));
    }

    #[test]
    fn test_invalid_identifier() {
        let err = ChainSpec::parse(&names(&["raw", "stag-ing"]), None, None, false).unwrap_err();
        assert!(matches!(err, ChainError::InvalidChainSpec { .. }));
    }

    #[test]
    fn test_empty_allow_list_rejected() {
        let err = ChainSpec::parse(&names(&["a", "b"]), None, Some(BTreeSet::new()), false)
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidChainSpec { .. }));
    }

    #[test]
    fn test_exclusions() {
        let spec = ChainSpec::parse(&names(&["a", "b"]), None, None, true)
            .unwrap()
            .with_exclusions(&["tmp_*".to_string(), "*_backup".to_string()])
            .unwrap();
        let tmp = TableName::try_new("tmp_load").unwrap();
        let backup = TableName::try_new("orders_backup").unwrap();
        let orders = TableName::try_new("orders").unwrap();
        assert_eq!(spec.exclusion_for(&tmp), Some("tmp_*"));
        assert_eq!(spec.exclusion_for(&backup), Some("*_backup"));
        assert_eq!(spec.exclusion_for(&orders), None);
        assert!(spec.force());
    }

    #[test]
    fn test_bad_exclusion_pattern() {
        let err = ChainSpec::parse(&names(&["a", "b"]), None, None, false)
            .unwrap()
            .with_exclusions(&["[".to_string()])
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidChainSpec { .. }));
    }
}
