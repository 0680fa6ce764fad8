//! Storefront schema plan
//!
//! The plan brings any earlier deployment's schema (empty, pre-category
//! products, single-column user names) to the current shape. It is run once
//! at startup before the listener binds.

use common::error::DatabaseResult;
use common::schema::{
    ColumnDef, Condition, DefaultValue, OnDelete, PgCatalog, ReconcileReport, Reconciler,
    References, SchemaCatalog, SqlType, Statement, Step, TableDef,
};
use sqlx::PgPool;
use tracing::{error, info, warn};

pub const SERVICE_CATEGORIES: &[&str] = &["repairs", "sales", "software"];

const CREATED_AT: ColumnDef =
    ColumnDef::new("created_at", SqlType::Timestamptz).default(DefaultValue::Now);

pub fn services_table() -> TableDef {
    TableDef {
        name: "services",
        columns: vec![
            ColumnDef::new("id", SqlType::Text).primary_key(),
            ColumnDef::new("title", SqlType::Text).not_null(),
            ColumnDef::new("description", SqlType::Text).not_null(),
            ColumnDef::new("category", SqlType::Text)
                .not_null()
                .check_in(SERVICE_CATEGORIES),
            CREATED_AT,
        ],
    }
}

pub fn users_table() -> TableDef {
    TableDef {
        name: "users",
        columns: vec![
            ColumnDef::new("id", SqlType::Serial).primary_key(),
            ColumnDef::new("first_name", SqlType::Text)
                .not_null()
                .default(DefaultValue::Text("")),
            ColumnDef::new("last_name", SqlType::Text)
                .not_null()
                .default(DefaultValue::Text("")),
            ColumnDef::new("email", SqlType::Text).unique().not_null(),
            ColumnDef::new("password_hash", SqlType::Text).not_null(),
            ColumnDef::new("role", SqlType::Text)
                .not_null()
                .default(DefaultValue::Text("user")),
            CREATED_AT,
        ],
    }
}

/// Products as first deployed; `category` and `image_url` are added later
pub fn products_table() -> TableDef {
    TableDef {
        name: "products",
        columns: vec![
            ColumnDef::new("id", SqlType::Serial).primary_key(),
            ColumnDef::new("name", SqlType::Text).not_null(),
            ColumnDef::new("price", SqlType::Numeric).not_null(),
            ColumnDef::new("condition", SqlType::Text).not_null(),
            ColumnDef::new("specs", SqlType::TextArray)
                .not_null()
                .default(DefaultValue::EmptyArray),
            CREATED_AT,
        ],
    }
}

pub fn appointments_table() -> TableDef {
    TableDef {
        name: "appointments",
        columns: vec![
            ColumnDef::new("id", SqlType::Serial).primary_key(),
            ColumnDef::new("user_id", SqlType::Integer).references(
                "users",
                "id",
                OnDelete::SetNull,
            ),
            ColumnDef::new("service_id", SqlType::Text),
            ColumnDef::new("notes", SqlType::Text),
            ColumnDef::new("date", SqlType::Date),
            ColumnDef::new("time", SqlType::Time),
            ColumnDef::new("status", SqlType::Text)
                .not_null()
                .default(DefaultValue::Text("pending")),
            CREATED_AT,
        ],
    }
}

pub fn password_resets_table() -> TableDef {
    TableDef {
        name: "password_resets",
        columns: vec![
            ColumnDef::new("id", SqlType::Serial).primary_key(),
            ColumnDef::new("user_id", SqlType::Integer).references(
                "users",
                "id",
                OnDelete::Cascade,
            ),
            ColumnDef::new("otp", SqlType::Text).not_null(),
            ColumnDef::new("expires_at", SqlType::Timestamptz).not_null(),
            ColumnDef::new("used_at", SqlType::Timestamptz),
            CREATED_AT,
        ],
    }
}

pub fn quotes_table() -> TableDef {
    TableDef {
        name: "quotes",
        columns: vec![
            ColumnDef::new("id", SqlType::Serial).primary_key(),
            ColumnDef::new("name", SqlType::Text).not_null(),
            ColumnDef::new("email", SqlType::Text).not_null(),
            ColumnDef::new("message", SqlType::Text).not_null(),
            CREATED_AT,
        ],
    }
}

const INDEXES: &[(&str, &str, &str)] = &[
    ("idx_quotes_created_at", "quotes", "created_at"),
    ("idx_quotes_email", "quotes", "email"),
    ("idx_products_condition", "products", "condition"),
    ("idx_products_created_at", "products", "created_at"),
    ("idx_products_category", "products", "category"),
    ("idx_services_category", "services", "category"),
    ("idx_services_created_at", "services", "created_at"),
    ("idx_appointments_user_id", "appointments", "user_id"),
    ("idx_appointments_created_at", "appointments", "created_at"),
    ("idx_password_resets_user_id", "password_resets", "user_id"),
    ("idx_password_resets_expires_at", "password_resets", "expires_at"),
];

fn create(id: &'static str, table: TableDef) -> Step {
    let name = table.name;
    Step::new(id, Statement::CreateTable(table)).when(Condition::TableMissing(name))
}

fn column_missing(table: &'static str, column: &'static str) -> Condition {
    Condition::ColumnMissing { table, column }
}

/// Steps of the legacy `users.name` migration
///
/// Every step is conditioned on `name` still being present and the column
/// is dropped last, so an interrupted migration picks up where it stopped.
fn legacy_user_name_steps() -> Vec<Step> {
    let legacy = Condition::ColumnPresent {
        table: "users",
        column: "name",
    };

    let mut steps = Vec::new();
    for (id, column) in [
        ("users.legacy.add_first_name", "first_name"),
        ("users.legacy.add_last_name", "last_name"),
    ] {
        steps.push(
            Step::new(
                id,
                Statement::AddColumn {
                    table: "users",
                    column: ColumnDef::new(column, SqlType::Text),
                },
            )
            .when(legacy.clone())
            .when(column_missing("users", column)),
        );
    }

    steps.push(
        Step::new(
            "users.legacy.split_name",
            Statement::SplitLegacyName {
                table: "users",
                source: "name",
                first: "first_name",
                last: "last_name",
            },
        )
        .when(legacy.clone()),
    );

    for (id, column) in [
        ("users.legacy.first_name_default", "first_name"),
        ("users.legacy.last_name_default", "last_name"),
    ] {
        steps.push(
            Step::new(
                id,
                Statement::SetDefault {
                    table: "users",
                    column,
                    value: DefaultValue::Text(""),
                },
            )
            .when(legacy.clone()),
        );
    }

    for (id, column) in [
        ("users.legacy.first_name_fill", "first_name"),
        ("users.legacy.last_name_fill", "last_name"),
    ] {
        steps.push(
            Step::new(
                id,
                Statement::FillNulls {
                    table: "users",
                    column,
                    value: "",
                },
            )
            .when(legacy.clone()),
        );
    }

    for (id, column) in [
        ("users.legacy.first_name_not_null", "first_name"),
        ("users.legacy.last_name_not_null", "last_name"),
    ] {
        steps.push(
            Step::new(id, Statement::SetNotNull { table: "users", column })
                .when(legacy.clone()),
        );
    }

    steps.push(
        Step::new(
            "users.legacy.drop_name",
            Statement::DropColumn {
                table: "users",
                column: "name",
            },
        )
        .when(legacy),
    );

    steps
}

/// The full storefront plan, in execution order
pub fn storefront_plan() -> Reconciler {
    let mut steps = vec![
        create("services.create", services_table()),
        create("users.create", users_table()),
        create("products.create", products_table()),
        // Existing rows receive the default, so no row is left without a category.
        Step::new(
            "products.category",
            Statement::AddColumn {
                table: "products",
                column: ColumnDef::new("category", SqlType::Text)
                    .not_null()
                    .default(DefaultValue::Text("laptop")),
            },
        )
        .when(column_missing("products", "category")),
        Step::new(
            "products.image_url",
            Statement::AddColumn {
                table: "products",
                column: ColumnDef::new("image_url", SqlType::Text),
            },
        )
        .when(column_missing("products", "image_url")),
        create("appointments.create", appointments_table()),
        create("password_resets.create", password_resets_table()),
        create("quotes.create", quotes_table()),
    ];

    steps.extend(legacy_user_name_steps());

    steps.push(
        Step::new(
            "appointments.service_fkey",
            Statement::AddForeignKey {
                table: "appointments",
                name: "appointments_service_id_fkey",
                column: "service_id",
                references: References {
                    table: "services",
                    column: "id",
                    on_delete: OnDelete::SetNull,
                },
            },
        )
        .when(Condition::ConstraintMissing {
            table: "appointments",
            name: "appointments_service_id_fkey",
        }),
    );

    for &(name, table, column) in INDEXES {
        steps.push(
            Step::new(name, Statement::CreateIndex { name, table, column })
                .when(Condition::IndexMissing(name)),
        );
    }

    Reconciler::new(steps)
}

/// Reconcile the storefront schema against any catalog
pub async fn reconcile(catalog: &dyn SchemaCatalog) -> DatabaseResult<ReconcileReport> {
    storefront_plan().run(catalog).await
}

/// Startup hook: reconcile when a database is configured
///
/// Failures are logged and startup continues; endpoints touching the
/// affected tables will then fail at query time.
pub async fn reconcile_at_startup(pool: Option<&PgPool>) {
    let Some(pool) = pool else {
        warn!("No database configured; skipping schema reconciliation");
        return;
    };

    let catalog = PgCatalog::new(pool.clone());
    match reconcile(&catalog).await {
        Ok(report) if report.is_noop() => {
            info!("Schema up to date ({} steps checked)", report.skipped);
        }
        Ok(report) => {
            info!(
                "Schema reconciled: {} steps applied, {} already satisfied",
                report.applied.len(),
                report.skipped
            );
        }
        Err(e) => {
            error!("Schema reconciliation failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_ids_are_unique() {
        let plan = storefront_plan();
        let mut ids: Vec<_> = plan.steps().iter().map(|step| step.id).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn test_every_step_is_conditioned() {
        for step in storefront_plan().steps() {
            assert!(!step.when.is_empty(), "step {} always runs", step.id);
        }
    }

    #[test]
    fn test_legacy_name_column_dropped_last() {
        let plan = storefront_plan();
        let ids: Vec<_> = plan.steps().iter().map(|step| step.id).collect();
        let drop = ids
            .iter()
            .position(|id| *id == "users.legacy.drop_name")
            .unwrap();
        assert!(
            ids[..drop]
                .iter()
                .filter(|id| id.starts_with("users.legacy."))
                .count()
                == 9
        );
        assert!(!ids[drop + 1..].iter().any(|id| id.starts_with("users.legacy.")));
    }

    #[test]
    fn test_tables_created_before_indexes() {
        let plan = storefront_plan();
        let ids: Vec<_> = plan.steps().iter().map(|step| step.id).collect();
        let last_create = ids.iter().rposition(|id| id.ends_with(".create")).unwrap();
        let first_index = ids.iter().position(|id| id.starts_with("idx_")).unwrap();
        assert!(last_create < first_index);
        assert_eq!(ids.iter().filter(|id| id.starts_with("idx_")).count(), 11);
    }
}
