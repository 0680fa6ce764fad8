use common::schema::{
    ColumnDef, DefaultValue, InMemoryCatalog, Reconciler, SchemaCatalog, SqlType, Statement,
    TableDef,
};
use storefront::schema::{
    appointments_table, password_resets_table, products_table, quotes_table, reconcile,
    services_table, storefront_plan,
};

/// Users as first deployed, with a single `name` column
fn legacy_users_table() -> TableDef {
    TableDef {
        name: "users",
        columns: vec![
            ColumnDef::new("id", SqlType::Serial).primary_key(),
            ColumnDef::new("name", SqlType::Text).not_null(),
            ColumnDef::new("email", SqlType::Text).unique().not_null(),
            ColumnDef::new("password_hash", SqlType::Text).not_null(),
            ColumnDef::new("role", SqlType::Text)
                .not_null()
                .default(DefaultValue::Text("user")),
            ColumnDef::new("created_at", SqlType::Timestamptz).default(DefaultValue::Now),
        ],
    }
}

/// A store left behind by the first release, with a few rows in it
async fn legacy_catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    for table in [
        services_table(),
        legacy_users_table(),
        products_table(),
        appointments_table(),
        password_resets_table(),
        quotes_table(),
    ] {
        catalog.apply(&Statement::CreateTable(table)).await.unwrap();
    }

    catalog
        .insert(
            "users",
            &[
                ("name", "Jane Doe"),
                ("email", "jane@example.com"),
                ("password_hash", "x"),
            ],
        )
        .unwrap();
    catalog
        .insert(
            "users",
            &[
                ("name", "Prince"),
                ("email", "prince@example.com"),
                ("password_hash", "x"),
            ],
        )
        .unwrap();
    catalog
        .insert(
            "products",
            &[("name", "Ultrabook X1"), ("price", "1299"), ("condition", "new")],
        )
        .unwrap();
    catalog
}

fn cell(row: &common::schema::Row, column: &str) -> Option<String> {
    row.get(column).cloned().flatten()
}

#[tokio::test]
async fn test_fresh_store_then_noop() {
    let catalog = InMemoryCatalog::new();

    let first = reconcile(&catalog).await.unwrap();
    assert!(first.applied.contains(&"users.create"));
    assert!(first.applied.contains(&"products.category"));
    assert!(!first.applied.iter().any(|id| id.starts_with("users.legacy.")));

    let second = reconcile(&catalog).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.skipped, storefront_plan().steps().len());
}

#[tokio::test]
async fn test_legacy_store_converges_to_fresh_shape() {
    let fresh = InMemoryCatalog::new();
    reconcile(&fresh).await.unwrap();

    let legacy = legacy_catalog().await;
    let report = reconcile(&legacy).await.unwrap();
    assert!(report.applied.contains(&"users.legacy.drop_name"));
    assert!(!report.applied.contains(&"users.create"));

    assert_eq!(legacy.snapshot(), fresh.snapshot());
    assert!(reconcile(&legacy).await.unwrap().is_noop());
}

#[tokio::test]
async fn test_current_store_is_left_alone() {
    let catalog = InMemoryCatalog::new();
    reconcile(&catalog).await.unwrap();
    catalog
        .insert(
            "users",
            &[
                ("first_name", "Ada"),
                ("last_name", "Lovelace"),
                ("email", "ada@example.com"),
                ("password_hash", "x"),
            ],
        )
        .unwrap();
    let before = catalog.snapshot();

    assert!(reconcile(&catalog).await.unwrap().is_noop());
    assert_eq!(catalog.snapshot(), before);
    assert_eq!(catalog.rows("users").len(), 1);
}

#[tokio::test]
async fn test_legacy_names_are_split() {
    let catalog = legacy_catalog().await;
    reconcile(&catalog).await.unwrap();

    let users = catalog.rows("users");
    let jane = users
        .iter()
        .find(|row| cell(row, "email").as_deref() == Some("jane@example.com"))
        .unwrap();
    assert_eq!(cell(jane, "first_name").as_deref(), Some("Jane"));
    assert_eq!(cell(jane, "last_name").as_deref(), Some("Doe"));
    assert!(!jane.contains_key("name"));

    let prince = users
        .iter()
        .find(|row| cell(row, "email").as_deref() == Some("prince@example.com"))
        .unwrap();
    assert_eq!(cell(prince, "first_name").as_deref(), Some("Prince"));
    assert_eq!(cell(prince, "last_name").as_deref(), Some(""));
}

#[tokio::test]
async fn test_existing_products_get_default_category() {
    let catalog = legacy_catalog().await;
    reconcile(&catalog).await.unwrap();

    let products = catalog.rows("products");
    assert_eq!(products.len(), 1);
    assert_eq!(cell(&products[0], "category").as_deref(), Some("laptop"));
    assert_eq!(cell(&products[0], "image_url"), None);
}

#[tokio::test]
async fn test_failed_run_resumes() {
    let fresh = InMemoryCatalog::new();
    reconcile(&fresh).await.unwrap();

    let catalog = legacy_catalog().await;
    catalog.set_failing_table(Some("users"));
    let err = reconcile(&catalog).await.unwrap_err();
    assert!(err.to_string().contains("users.legacy.add_first_name"));
    // Steps before the failure stay applied
    assert!(catalog.column_exists("products", "category").await.unwrap());

    catalog.set_failing_table(None);
    let report = reconcile(&catalog).await.unwrap();
    assert!(report.applied.contains(&"users.legacy.add_first_name"));
    assert!(!report.applied.contains(&"products.category"));
    assert_eq!(catalog.snapshot(), fresh.snapshot());
}

#[tokio::test]
async fn test_interrupted_name_migration_completes() {
    let fresh = InMemoryCatalog::new();
    reconcile(&fresh).await.unwrap();

    let catalog = legacy_catalog().await;
    let plan = storefront_plan();
    let split = plan
        .steps()
        .iter()
        .position(|step| step.id == "users.legacy.split_name")
        .unwrap();
    Reconciler::new(plan.steps()[..=split].to_vec())
        .run(&catalog)
        .await
        .unwrap();
    assert!(catalog.column_exists("users", "name").await.unwrap());

    let report = reconcile(&catalog).await.unwrap();
    assert!(!report.applied.contains(&"users.legacy.add_first_name"));
    assert!(report.applied.contains(&"users.legacy.drop_name"));
    assert_eq!(catalog.snapshot(), fresh.snapshot());

    let jane = catalog
        .rows("users")
        .into_iter()
        .find(|row| cell(row, "email").as_deref() == Some("jane@example.com"))
        .unwrap();
    assert_eq!(cell(&jane, "first_name").as_deref(), Some("Jane"));
}
