//! Schema reconciliation
//!
//! Brings a PostgreSQL schema up to the shape the application expects using
//! a declarative list of steps. Every step carries the conditions under
//! which it applies; the runner re-checks them against the live catalog
//! immediately before acting, so any prefix of a plan can be replayed and a
//! fully reconciled schema is left untouched.

mod memory;
mod postgres;
mod statement;

use async_trait::async_trait;
use tracing::info;

use crate::error::{DatabaseError, DatabaseResult};

pub use memory::{ColumnShape, InMemoryCatalog, Row, SchemaSnapshot};
pub use postgres::PgCatalog;
pub use statement::{
    ColumnDef, DefaultValue, OnDelete, References, SqlType, Statement, TableDef,
};

/// Introspection and DDL surface of a relational store
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    async fn table_exists(&self, table: &str) -> DatabaseResult<bool>;

    async fn column_exists(&self, table: &str, column: &str) -> DatabaseResult<bool>;

    async fn constraint_exists(&self, table: &str, name: &str) -> DatabaseResult<bool>;

    async fn index_exists(&self, name: &str) -> DatabaseResult<bool>;

    async fn apply(&self, statement: &Statement) -> DatabaseResult<()>;
}

/// Precondition checked against the catalog before a step runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    TableMissing(&'static str),
    ColumnMissing {
        table: &'static str,
        column: &'static str,
    },
    ColumnPresent {
        table: &'static str,
        column: &'static str,
    },
    ConstraintMissing {
        table: &'static str,
        name: &'static str,
    },
    IndexMissing(&'static str),
}

impl Condition {
    async fn holds(&self, catalog: &dyn SchemaCatalog) -> DatabaseResult<bool> {
        Ok(match self {
            Condition::TableMissing(table) => !catalog.table_exists(table).await?,
            Condition::ColumnMissing { table, column } => {
                !catalog.column_exists(table, column).await?
            }
            Condition::ColumnPresent { table, column } => {
                catalog.column_exists(table, column).await?
            }
            Condition::ConstraintMissing { table, name } => {
                !catalog.constraint_exists(table, name).await?
            }
            Condition::IndexMissing(name) => !catalog.index_exists(name).await?,
        })
    }
}

/// One unit of a reconciliation plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Stable identifier used in logs and errors
    pub id: &'static str,
    /// All conditions must hold for the statement to run
    pub when: Vec<Condition>,
    pub statement: Statement,
}

impl Step {
    pub fn new(id: &'static str, statement: Statement) -> Self {
        Self {
            id,
            when: Vec::new(),
            statement,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.when.push(condition);
        self
    }
}

/// Summary of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ids of the steps whose statement was executed, in order
    pub applied: Vec<&'static str>,
    /// Number of steps whose conditions did not hold
    pub skipped: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies a plan of steps strictly in declared order
#[derive(Debug, Clone)]
pub struct Reconciler {
    steps: Vec<Step>,
}

impl Reconciler {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run every step whose conditions hold
    ///
    /// The first failing step aborts the run. Steps already applied stay
    /// applied; a later run resumes from the first step whose conditions
    /// still hold.
    pub async fn run(&self, catalog: &dyn SchemaCatalog) -> DatabaseResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for step in &self.steps {
            if !self.should_apply(step, catalog).await? {
                report.skipped += 1;
                continue;
            }

            catalog
                .apply(&step.statement)
                .await
                .map_err(|e| DatabaseError::Migration {
                    step: step.id,
                    source: Box::new(e),
                })?;
            info!("Applied schema step {}", step.id);
            report.applied.push(step.id);
        }

        Ok(report)
    }

    async fn should_apply(&self, step: &Step, catalog: &dyn SchemaCatalog) -> DatabaseResult<bool> {
        for condition in &step.when {
            let holds = condition
                .holds(catalog)
                .await
                .map_err(|e| DatabaseError::Migration {
                    step: step.id,
                    source: Box::new(e),
                })?;
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Split a full name at its first space
///
/// Leading and trailing spaces are ignored, matching PostgreSQL's `btrim`;
/// other whitespace is kept. A name without a space becomes
/// the first name with an empty last name; everything after the first space
/// is kept verbatim as the last name.
pub fn split_full_name(full_name: &str) -> (String, String) {
    let trimmed = full_name.trim_matches(' ');
    match trimmed.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TableDef {
        TableDef {
            name: "people",
            columns: vec![
                ColumnDef::new("id", SqlType::Serial).primary_key(),
                ColumnDef::new("nickname", SqlType::Text),
            ],
        }
    }

    fn plan() -> Reconciler {
        Reconciler::new(vec![
            Step::new("people.create", Statement::CreateTable(people()))
                .when(Condition::TableMissing("people")),
            Step::new(
                "people.age",
                Statement::AddColumn {
                    table: "people",
                    column: ColumnDef::new("age", SqlType::Integer),
                },
            )
            .when(Condition::ColumnMissing {
                table: "people",
                column: "age",
            }),
            Step::new(
                "people.nickname_idx",
                Statement::CreateIndex {
                    name: "idx_people_nickname",
                    table: "people",
                    column: "nickname",
                },
            )
            .when(Condition::IndexMissing("idx_people_nickname")),
        ])
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(
            split_full_name("Jane Doe"),
            ("Jane".to_string(), "Doe".to_string())
        );
        assert_eq!(
            split_full_name("  Cher  "),
            ("Cher".to_string(), String::new())
        );
        assert_eq!(
            split_full_name("Mary Ann van Dyke"),
            ("Mary".to_string(), "Ann van Dyke".to_string())
        );
        assert_eq!(split_full_name(""), (String::new(), String::new()));
    }

    #[test]
    fn test_split_full_name_trims_spaces_only() {
        assert_eq!(
            split_full_name("\tJane Doe"),
            ("\tJane".to_string(), "Doe".to_string())
        );
        assert_eq!(
            split_full_name("  Mary Ann  van Dyke "),
            ("Mary".to_string(), "Ann  van Dyke".to_string())
        );
    }

    #[tokio::test]
    async fn test_run_applies_then_skips() {
        let catalog = InMemoryCatalog::new();
        let reconciler = plan();

        let first = reconciler.run(&catalog).await.unwrap();
        assert_eq!(
            first.applied,
            vec!["people.create", "people.age", "people.nickname_idx"]
        );
        assert_eq!(first.skipped, 0);

        let second = reconciler.run(&catalog).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(second.skipped, 3);
    }

    #[tokio::test]
    async fn test_failing_step_aborts_run_with_step_id() {
        let catalog = InMemoryCatalog::new();
        let reconciler = Reconciler::new(vec![
            Step::new(
                "ghost.column",
                Statement::AddColumn {
                    table: "ghost",
                    column: ColumnDef::new("x", SqlType::Text),
                },
            ),
            Step::new("people.create", Statement::CreateTable(people())),
        ]);

        let err = reconciler.run(&catalog).await.unwrap_err();
        match err {
            DatabaseError::Migration { step, .. } => assert_eq!(step, "ghost.column"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!catalog.table_exists("people").await.unwrap());
    }

    #[tokio::test]
    async fn test_partial_plan_resumes() {
        let catalog = InMemoryCatalog::new();
        let full = plan();
        let prefix = Reconciler::new(full.steps()[..1].to_vec());

        prefix.run(&catalog).await.unwrap();
        let resumed = full.run(&catalog).await.unwrap();
        assert_eq!(resumed.applied, vec!["people.age", "people.nickname_idx"]);
        assert_eq!(resumed.skipped, 1);
    }
}
