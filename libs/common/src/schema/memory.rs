//! In-memory catalog
//!
//! Models just enough of a relational store (tables, typed columns with
//! defaults and nullability, named constraints, indexes and rows) to apply
//! schema statements with PostgreSQL's observable behaviour: non-idempotent
//! statements fail when repeated, `IF NOT EXISTS` statements do not.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::statement::{ColumnDef, DefaultValue, SqlType, Statement, TableDef};
use super::{SchemaCatalog, split_full_name};
use crate::error::{DatabaseError, DatabaseResult};

/// Row values keyed by column name; `None` is SQL `NULL`
pub type Row = BTreeMap<String, Option<String>>;

/// Observable shape of a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnShape {
    pub sql_type: SqlType,
    pub not_null: bool,
    pub default: Option<DefaultValue>,
}

/// Order-insensitive description of a whole schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub tables: BTreeMap<String, BTreeMap<String, ColumnShape>>,
    /// `(table, constraint name)` pairs
    pub constraints: BTreeSet<(String, String)>,
    pub indexes: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Table {
    columns: Vec<(String, ColumnShape)>,
    rows: Vec<Row>,
    next_serial: u64,
}

impl Table {
    fn shape(&self, column: &str) -> Option<&ColumnShape> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, shape)| shape)
    }

    fn shape_mut(&mut self, column: &str) -> Option<&mut ColumnShape> {
        self.columns
            .iter_mut()
            .find(|(name, _)| name == column)
            .map(|(_, shape)| shape)
    }
}

#[derive(Debug)]
struct Index {
    table: String,
    column: String,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    constraints: BTreeSet<(String, String)>,
    indexes: BTreeMap<String, Index>,
    failing_table: Option<String>,
}

/// Schema catalog held entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: Mutex<State>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a row, filling defaults and serial columns for omitted values
    pub fn insert(&self, table: &str, values: &[(&str, &str)]) -> DatabaseResult<()> {
        let mut state = self.lock();
        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;

        for (column, _) in values {
            if target.shape(column).is_none() {
                return Err(missing_column(table, column));
            }
        }

        target.next_serial += 1;
        let serial = target.next_serial.to_string();
        let mut row = Row::new();
        for (name, shape) in &target.columns {
            let explicit = values
                .iter()
                .find(|(column, _)| *column == name.as_str())
                .map(|(_, value)| value.to_string());
            let value = match explicit {
                Some(value) => Some(value),
                None if shape.sql_type == SqlType::Serial => Some(serial.clone()),
                None => shape.default.map(default_value),
            };
            if value.is_none() && shape.not_null {
                return Err(DatabaseError::Catalog(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    name, table
                )));
            }
            row.insert(name.clone(), value);
        }
        target.rows.push(row);
        Ok(())
    }

    /// Current rows of a table, empty when the table does not exist
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Make every statement targeting `table` fail until cleared with `None`
    pub fn set_failing_table(&self, table: Option<&str>) {
        self.lock().failing_table = table.map(str::to_string);
    }

    pub fn snapshot(&self) -> SchemaSnapshot {
        let state = self.lock();
        SchemaSnapshot {
            tables: state
                .tables
                .iter()
                .map(|(name, table)| {
                    let columns = table
                        .columns
                        .iter()
                        .map(|(column, shape)| (column.clone(), shape.clone()))
                        .collect();
                    (name.clone(), columns)
                })
                .collect(),
            constraints: state.constraints.clone(),
            indexes: state.indexes.keys().cloned().collect(),
        }
    }
}

#[async_trait]
impl SchemaCatalog for InMemoryCatalog {
    async fn table_exists(&self, table: &str) -> DatabaseResult<bool> {
        Ok(self.lock().tables.contains_key(table))
    }

    async fn column_exists(&self, table: &str, column: &str) -> DatabaseResult<bool> {
        Ok(self
            .lock()
            .tables
            .get(table)
            .is_some_and(|t| t.shape(column).is_some()))
    }

    async fn constraint_exists(&self, table: &str, name: &str) -> DatabaseResult<bool> {
        Ok(self
            .lock()
            .constraints
            .contains(&(table.to_string(), name.to_string())))
    }

    async fn index_exists(&self, name: &str) -> DatabaseResult<bool> {
        Ok(self.lock().indexes.contains_key(name))
    }

    async fn apply(&self, statement: &Statement) -> DatabaseResult<()> {
        let mut state = self.lock();
        if state.failing_table.as_deref() == Some(target_table(statement)) {
            return Err(DatabaseError::Catalog(format!(
                "injected failure for {}",
                statement.to_sql()
            )));
        }
        apply_statement(&mut state, statement)
    }
}

fn apply_statement(state: &mut State, statement: &Statement) -> DatabaseResult<()> {
    match statement {
        Statement::CreateTable(def) => {
            create_table(state, def);
            Ok(())
        }
        Statement::AddColumn { table, column } => add_column(state, table, column),
        Statement::FillNulls {
            table,
            column,
            value,
        } => {
            let target = table_mut(state, table)?;
            require_column(target, table, column)?;
            for row in &mut target.rows {
                let cell = row.entry(column.to_string()).or_default();
                if cell.is_none() {
                    *cell = Some(value.to_string());
                }
            }
            Ok(())
        }
        Statement::SplitLegacyName {
            table,
            source,
            first,
            last,
        } => {
            let target = table_mut(state, table)?;
            for column in [source, first, last] {
                require_column(target, table, column)?;
            }
            for row in &mut target.rows {
                if row.get(*first).is_some_and(Option::is_some) {
                    continue;
                }
                let full = row.get(*source).cloned().flatten().unwrap_or_default();
                let (first_name, last_name) = split_full_name(&full);
                row.insert(first.to_string(), Some(first_name));
                let existing_last = row.get(*last).cloned().flatten();
                row.insert(last.to_string(), Some(existing_last.unwrap_or(last_name)));
            }
            Ok(())
        }
        Statement::SetDefault {
            table,
            column,
            value,
        } => {
            let target = table_mut(state, table)?;
            let shape = target
                .shape_mut(column)
                .ok_or_else(|| missing_column(table, column))?;
            shape.default = Some(*value);
            Ok(())
        }
        Statement::SetNotNull { table, column } => {
            let target = table_mut(state, table)?;
            require_column(target, table, column)?;
            if target
                .rows
                .iter()
                .any(|row| row.get(*column).is_none_or(Option::is_none))
            {
                return Err(DatabaseError::Catalog(format!(
                    "column \"{}\" of relation \"{}\" contains null values",
                    column, table
                )));
            }
            if let Some(shape) = target.shape_mut(column) {
                shape.not_null = true;
            }
            Ok(())
        }
        Statement::DropColumn { table, column } => {
            let target = table_mut(state, table)?;
            require_column(target, table, column)?;
            target.columns.retain(|(name, _)| name != column);
            for row in &mut target.rows {
                row.remove(*column);
            }
            let prefix = format!("{}_{}_", table, column);
            state
                .constraints
                .retain(|(owner, name)| !(owner.as_str() == *table && name.starts_with(&prefix)));
            state
                .indexes
                .retain(|_, index| !(index.table == *table && index.column == *column));
            Ok(())
        }
        Statement::AddForeignKey {
            table,
            name,
            column,
            references,
        } => {
            require_column(table_ref(state, table)?, table, column)?;
            require_column(
                table_ref(state, references.table)?,
                references.table,
                references.column,
            )?;
            let key = (table.to_string(), name.to_string());
            if state.constraints.contains(&key) {
                return Err(DatabaseError::Catalog(format!(
                    "constraint \"{}\" for relation \"{}\" already exists",
                    name, table
                )));
            }
            state.constraints.insert(key);
            Ok(())
        }
        Statement::CreateIndex {
            name,
            table,
            column,
        } => {
            require_column(table_ref(state, table)?, table, column)?;
            state
                .indexes
                .entry(name.to_string())
                .or_insert_with(|| Index {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            Ok(())
        }
    }
}

fn create_table(state: &mut State, def: &TableDef) {
    if state.tables.contains_key(def.name) {
        return;
    }
    let mut table = Table::default();
    for column in &def.columns {
        table.columns.push((column.name.to_string(), shape_of(column)));
        register_constraints(state, def.name, column);
    }
    state.tables.insert(def.name.to_string(), table);
}

fn add_column(state: &mut State, table: &str, column: &ColumnDef) -> DatabaseResult<()> {
    let target = table_mut(state, table)?;
    if target.shape(column.name).is_some() {
        return Err(DatabaseError::Catalog(format!(
            "column \"{}\" of relation \"{}\" already exists",
            column.name, table
        )));
    }
    let fill = column.default.map(default_value);
    if column.not_null && fill.is_none() && !target.rows.is_empty() {
        return Err(DatabaseError::Catalog(format!(
            "column \"{}\" of relation \"{}\" contains null values",
            column.name, table
        )));
    }
    target
        .columns
        .push((column.name.to_string(), shape_of(column)));
    for row in &mut target.rows {
        row.insert(column.name.to_string(), fill.clone());
    }
    register_constraints(state, table, column);
    Ok(())
}

fn register_constraints(state: &mut State, table: &str, column: &ColumnDef) {
    let mut names = Vec::new();
    if column.primary_key {
        names.push(format!("{}_pkey", table));
    }
    if column.unique {
        names.push(format!("{}_{}_key", table, column.name));
    }
    if !column.check_in.is_empty() {
        names.push(format!("{}_{}_check", table, column.name));
    }
    if column.references.is_some() {
        names.push(format!("{}_{}_fkey", table, column.name));
    }
    for name in names {
        state.constraints.insert((table.to_string(), name));
    }
}

fn shape_of(column: &ColumnDef) -> ColumnShape {
    ColumnShape {
        sql_type: column.sql_type,
        not_null: column.not_null || column.primary_key,
        default: column.default,
    }
}

fn default_value(value: DefaultValue) -> String {
    match value {
        DefaultValue::Text(text) => text.to_string(),
        DefaultValue::Now => "now()".to_string(),
        DefaultValue::EmptyArray => "{}".to_string(),
    }
}

fn target_table(statement: &Statement) -> &str {
    match statement {
        Statement::CreateTable(def) => def.name,
        Statement::AddColumn { table, .. }
        | Statement::FillNulls { table, .. }
        | Statement::SplitLegacyName { table, .. }
        | Statement::SetDefault { table, .. }
        | Statement::SetNotNull { table, .. }
        | Statement::DropColumn { table, .. }
        | Statement::AddForeignKey { table, .. }
        | Statement::CreateIndex { table, .. } => *table,
    }
}

fn table_ref<'a>(state: &'a State, table: &str) -> DatabaseResult<&'a Table> {
    state.tables.get(table).ok_or_else(|| missing_table(table))
}

fn table_mut<'a>(state: &'a mut State, table: &str) -> DatabaseResult<&'a mut Table> {
    state
        .tables
        .get_mut(table)
        .ok_or_else(|| missing_table(table))
}

fn require_column(table: &Table, name: &str, column: &str) -> DatabaseResult<()> {
    match table.shape(column) {
        Some(_) => Ok(()),
        None => Err(missing_column(name, column)),
    }
}

fn missing_table(table: &str) -> DatabaseError {
    DatabaseError::Catalog(format!("relation \"{}\" does not exist", table))
}

fn missing_column(table: &str, column: &str) -> DatabaseError {
    DatabaseError::Catalog(format!(
        "column \"{}\" of relation \"{}\" does not exist",
        column, table
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gadgets() -> TableDef {
        TableDef {
            name: "gadgets",
            columns: vec![
                ColumnDef::new("id", SqlType::Serial).primary_key(),
                ColumnDef::new("label", SqlType::Text).not_null(),
            ],
        }
    }

    #[tokio::test]
    async fn test_create_table_is_idempotent() {
        let catalog = InMemoryCatalog::new();
        let create = Statement::CreateTable(gadgets());
        catalog.apply(&create).await.unwrap();
        catalog.insert("gadgets", &[("label", "a")]).unwrap();
        catalog.apply(&create).await.unwrap();

        assert_eq!(catalog.rows("gadgets").len(), 1);
        assert!(catalog.constraint_exists("gadgets", "gadgets_pkey").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_column_twice_fails() {
        let catalog = InMemoryCatalog::new();
        catalog.apply(&Statement::CreateTable(gadgets())).await.unwrap();
        let add = Statement::AddColumn {
            table: "gadgets",
            column: ColumnDef::new("colour", SqlType::Text),
        };
        catalog.apply(&add).await.unwrap();
        assert!(catalog.apply(&add).await.is_err());
    }

    #[tokio::test]
    async fn test_not_null_column_without_default_rejected_on_populated_table() {
        let catalog = InMemoryCatalog::new();
        catalog.apply(&Statement::CreateTable(gadgets())).await.unwrap();
        catalog.insert("gadgets", &[("label", "a")]).unwrap();

        let add = Statement::AddColumn {
            table: "gadgets",
            column: ColumnDef::new("weight", SqlType::Numeric).not_null(),
        };
        assert!(catalog.apply(&add).await.is_err());
        assert!(!catalog.column_exists("gadgets", "weight").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_enforces_not_null() {
        let catalog = InMemoryCatalog::new();
        catalog.apply(&Statement::CreateTable(gadgets())).await.unwrap();
        assert!(catalog.insert("gadgets", &[]).is_err());
        assert!(catalog.insert("gadgets", &[("missing", "x")]).is_err());
    }

    #[tokio::test]
    async fn test_drop_column_removes_dependent_index() {
        let catalog = InMemoryCatalog::new();
        catalog.apply(&Statement::CreateTable(gadgets())).await.unwrap();
        catalog
            .apply(&Statement::CreateIndex {
                name: "idx_gadgets_label",
                table: "gadgets",
                column: "label",
            })
            .await
            .unwrap();
        catalog
            .apply(&Statement::DropColumn {
                table: "gadgets",
                column: "label",
            })
            .await
            .unwrap();

        assert!(!catalog.index_exists("idx_gadgets_label").await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_failure_only_hits_target_table() {
        let catalog = InMemoryCatalog::new();
        catalog.set_failing_table(Some("gadgets"));
        assert!(catalog.apply(&Statement::CreateTable(gadgets())).await.is_err());

        catalog.set_failing_table(None);
        catalog.apply(&Statement::CreateTable(gadgets())).await.unwrap();
        assert!(catalog.table_exists("gadgets").await.unwrap());
    }
}
