//! Integration tests for the PostgreSQL catalog
//!
//! These tests run against the database named by `DATABASE_URL` and are
//! skipped when it is not set. Each test works in its own schema so that
//! runs do not interfere with application tables.

use common::database::{DatabaseConfig, health_check, init_pool};
use common::schema::{
    ColumnDef, Condition, PgCatalog, Reconciler, SchemaCatalog, SqlType, Statement, Step,
    TableDef,
};
use sqlx::PgPool;

async fn scoped_pool(schema: &str) -> Option<PgPool> {
    let config = DatabaseConfig::from_env()?;
    let admin = init_pool(&config).await.ok()?;
    sqlx::raw_sql(&format!(
        "DROP SCHEMA IF EXISTS {schema} CASCADE; CREATE SCHEMA {schema}"
    ))
    .execute(&admin)
    .await
    .ok()?;

    let options: sqlx::postgres::PgConnectOptions = config.database_url.parse().ok()?;
    let options = options.options([("search_path", schema)]);
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .ok()
}

fn widgets_plan() -> Reconciler {
    let widgets = TableDef {
        name: "widgets",
        columns: vec![
            ColumnDef::new("id", SqlType::Serial).primary_key(),
            ColumnDef::new("label", SqlType::Text).not_null(),
        ],
    };
    Reconciler::new(vec![
        Step::new("widgets.create", Statement::CreateTable(widgets))
            .when(Condition::TableMissing("widgets")),
        Step::new(
            "widgets.colour",
            Statement::AddColumn {
                table: "widgets",
                column: ColumnDef::new("colour", SqlType::Text),
            },
        )
        .when(Condition::ColumnMissing {
            table: "widgets",
            column: "colour",
        }),
        Step::new(
            "widgets.label_idx",
            Statement::CreateIndex {
                name: "idx_widgets_label",
                table: "widgets",
                column: "label",
            },
        )
        .when(Condition::IndexMissing("idx_widgets_label")),
    ])
}

#[tokio::test]
async fn test_reconcile_twice_against_postgres() -> Result<(), Box<dyn std::error::Error>> {
    let Some(pool) = scoped_pool("catalog_it_twice").await else {
        return Ok(());
    };
    assert!(health_check(&pool).await?);

    let catalog = PgCatalog::new(pool);
    let plan = widgets_plan();

    let first = plan.run(&catalog).await?;
    assert_eq!(first.applied.len(), 3);
    assert!(catalog.column_exists("widgets", "colour").await?);
    assert!(catalog.index_exists("idx_widgets_label").await?);
    assert!(catalog.constraint_exists("widgets", "widgets_pkey").await?);

    let second = plan.run(&catalog).await?;
    assert!(second.is_noop());

    Ok(())
}
