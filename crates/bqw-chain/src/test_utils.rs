//! In-memory warehouse with scripted failures for chain tests.

use async_trait::async_trait;
use bqw_core::{DatasetRef, ProjectId, TableName};
use bqw_db::{DatasetInfo, DbError, DbResult, TableInfo, TableKind, Warehouse};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct State {
    datasets: BTreeMap<DatasetRef, BTreeMap<TableName, TableKind>>,
    failures: HashMap<String, VecDeque<DbError>>,
    calls: Vec<String>,
    cancel_after: Option<(usize, CancellationToken)>,
    ignore_projects: bool,
}

impl State {
    /// Record the call and hand out the next scripted error for it, if any.
    fn enter(&mut self, call: String) -> DbResult<()> {
        let scripted = self.failures.get_mut(&call).and_then(VecDeque::pop_front);
        self.calls.push(call);
        match scripted {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A [`Warehouse`] held entirely in memory.
///
/// Every call is recorded as `"<method> <argument>"`; failures can be
/// queued per call and are handed out one per attempt.
#[derive(Default)]
pub struct ScriptedWarehouse {
    state: Mutex<State>,
}

fn dataset(name: &str) -> DatasetRef {
    DatasetRef::parse(name, None).expect("valid dataset name")
}

fn table(name: &str) -> TableName {
    TableName::try_new(name).expect("valid table name")
}

impl ScriptedWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `p.ds` and `ds` as the same dataset, like DuckDB does.
    pub fn ignoring_projects(self) -> Self {
        self.lock().ignore_projects = true;
        self
    }

    /// Add a dataset holding base tables.
    pub fn with_dataset(self, name: &str, tables: &[&str]) -> Self {
        self.lock().datasets.insert(
            dataset(name),
            tables.iter().map(|t| (table(t), TableKind::Table)).collect(),
        );
        self
    }

    pub fn fail_list_tables(&self, name: &str, errors: Vec<DbError>) {
        self.script(format!("list_tables {}", dataset(name)), errors);
    }

    pub fn fail_create_dataset(&self, name: &str, errors: Vec<DbError>) {
        self.script(format!("create_dataset {}", dataset(name)), errors);
    }

    pub fn fail_view(&self, target: &str, view: &str, errors: Vec<DbError>) {
        self.script(format!("view {}.{}", dataset(target), view), errors);
    }

    /// Cancel `token` once `views` view upserts have been issued.
    pub fn cancel_after_views(&self, views: usize, token: CancellationToken) {
        self.lock().cancel_after = Some((views, token));
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// `target.view` of every view upsert attempt, in call order.
    pub fn view_calls(&self) -> Vec<String> {
        self.calls_of("view ")
    }

    pub fn create_calls(&self) -> Vec<String> {
        self.calls_of("create_dataset ")
    }

    pub fn list_calls(&self) -> usize {
        self.calls_of("list_tables ").len()
    }

    pub fn has_dataset(&self, name: &str) -> bool {
        self.lock().datasets.contains_key(&dataset(name))
    }

    /// Names and kinds currently in a dataset.
    pub fn relations(&self, name: &str) -> Vec<(String, TableKind)> {
        self.lock()
            .datasets
            .get(&dataset(name))
            .map(|tables| {
                tables
                    .iter()
                    .map(|(t, k)| (t.to_string(), k.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn script(&self, call: String, errors: Vec<DbError>) {
        self.lock()
            .failures
            .entry(call)
            .or_default()
            .extend(errors);
    }

    fn calls_of(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| c.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn not_found(dataset: &DatasetRef) -> DbError {
    DbError::NotFound(format!("Dataset {}", dataset))
}

#[async_trait]
impl Warehouse for ScriptedWarehouse {
    async fn dataset_exists(&self, dataset: &DatasetRef) -> DbResult<bool> {
        let mut state = self.lock();
        state.enter(format!("dataset_exists {}", dataset))?;
        Ok(state.datasets.contains_key(dataset))
    }

    async fn list_datasets(&self, _project: Option<&ProjectId>) -> DbResult<Vec<DatasetRef>> {
        let mut state = self.lock();
        state.enter("list_datasets".to_string())?;
        Ok(state.datasets.keys().cloned().collect())
    }

    async fn list_tables(&self, dataset: &DatasetRef) -> DbResult<Vec<TableInfo>> {
        let mut state = self.lock();
        state.enter(format!("list_tables {}", dataset))?;
        let tables = state.datasets.get(dataset).ok_or_else(|| not_found(dataset))?;
        Ok(tables
            .iter()
            .map(|(name, kind)| TableInfo {
                name: name.clone(),
                kind: kind.clone(),
            })
            .collect())
    }

    async fn describe_dataset(&self, dataset: &DatasetRef) -> DbResult<DatasetInfo> {
        let tables = self.list_tables(dataset).await?;
        Ok(DatasetInfo {
            dataset: dataset.clone(),
            description: None,
            location: Some("US".to_string()),
            labels: BTreeMap::new(),
            tables,
        })
    }

    async fn create_dataset(&self, dataset: &DatasetRef, _location: &str) -> DbResult<()> {
        let mut state = self.lock();
        state.enter(format!("create_dataset {}", dataset))?;
        state.datasets.entry(dataset.clone()).or_default();
        Ok(())
    }

    async fn delete_dataset(&self, dataset: &DatasetRef) -> DbResult<()> {
        let mut state = self.lock();
        state.enter(format!("delete_dataset {}", dataset))?;
        state.datasets.remove(dataset);
        Ok(())
    }

    async fn create_or_replace_view(
        &self,
        target: &DatasetRef,
        view: &TableName,
        source: &DatasetRef,
        table: &TableName,
    ) -> DbResult<()> {
        let mut state = self.lock();
        let issued = state.calls.iter().filter(|c| c.starts_with("view ")).count() + 1;
        if let Some((after, token)) = &state.cancel_after {
            if issued >= *after {
                token.cancel();
            }
        }
        state.enter(format!("view {}.{}", target, view))?;

        let source_tables = state.datasets.get(source).ok_or_else(|| not_found(source))?;
        if !source_tables.contains_key(table) {
            return Err(DbError::NotFound(format!("Table {}", source.table_path(table))));
        }
        let target_tables = state
            .datasets
            .get_mut(target)
            .ok_or_else(|| not_found(target))?;
        target_tables.insert(view.clone(), TableKind::View);
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "scripted"
    }

    fn canonical(&self, dataset: &DatasetRef) -> DatasetRef {
        if self.lock().ignore_projects {
            DatasetRef::new(None, dataset.dataset.clone())
        } else {
            dataset.clone()
        }
    }
}
