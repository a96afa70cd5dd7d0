//! SQL identifier quoting for the two backend dialects.

/// Quote a DuckDB identifier, doubling embedded double quotes.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a `schema.relation` pair for DuckDB.
pub(crate) fn quote_relation(schema: &str, relation: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(relation))
}

/// Quote a BigQuery `project.dataset.table` path with backticks.
pub(crate) fn quote_bq_path(project: &str, dataset: &str, table: &str) -> String {
    format!(
        "`{}.{}.{}`",
        project.replace('`', "\\`"),
        dataset,
        table.replace('`', "\\`")
    )
}
