//! Default catalog content and the bootstrap admin account

use anyhow::Result;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::{
    config::AppConfig,
    models::{FeaturedProduct, NewProduct, NewUser, Role, SeedService},
    password::{generate_password, hash_password},
    repositories::{ProductRepository, ServiceRepository, UserRepository},
};

pub const SEED_SERVICES: &[SeedService] = &[
    SeedService {
        id: "phone-repair",
        title: "Phone Repairs",
        description: "Screen, battery, water damage, diagnostics",
        category: "repairs",
    },
    SeedService {
        id: "laptop-repair",
        title: "Laptop Repairs",
        description: "Hardware fixes, upgrades, cleaning, OS reinstall",
        category: "repairs",
    },
    SeedService {
        id: "sales-new",
        title: "Laptops - Brand New",
        description: "Curated selection of the latest laptops",
        category: "sales",
    },
    SeedService {
        id: "sales-refurb",
        title: "Laptops - Refurbished",
        description: "Tested, warrantied refurbished models",
        category: "sales",
    },
    SeedService {
        id: "dev-mobile",
        title: "Mobile App Development",
        description: "iOS/Android apps tailored to your business",
        category: "software",
    },
    SeedService {
        id: "dev-web",
        title: "Website Development",
        description: "Modern, fast, SEO-friendly websites",
        category: "software",
    },
];

pub const FEATURED_PRODUCTS: &[FeaturedProduct] = &[
    FeaturedProduct {
        id: "nb-001",
        name: "Ultrabook X1",
        price: 1299.0,
        condition: "new",
        specs: &["13.3\" OLED", "16GB RAM", "512GB SSD"],
    },
    FeaturedProduct {
        id: "nb-101",
        name: "ProBook R5 (Refurb)",
        price: 699.0,
        condition: "refurbished",
        specs: &["15.6\" IPS", "16GB RAM", "256GB SSD"],
    },
];

/// Fill empty service and product tables with the built-in catalog
pub async fn seed_defaults(pool: &PgPool) {
    if let Err(e) = seed_catalog(pool).await {
        error!("Seeding failed: {}", e);
    }
}

async fn seed_catalog(pool: &PgPool) -> Result<()> {
    let services = ServiceRepository::new(pool.clone());
    if services.count().await? == 0 {
        for service in SEED_SERVICES {
            services.insert_seed(service).await?;
        }
        info!("Seeded default services");
    }

    let products = ProductRepository::new(pool.clone());
    if products.count().await? == 0 {
        for product in FEATURED_PRODUCTS {
            products
                .create(&NewProduct {
                    name: product.name.to_string(),
                    price: product.price,
                    condition: product.condition.to_string(),
                    specs: product.specs.iter().map(|s| s.to_string()).collect(),
                    image_url: None,
                    category: "laptop".to_string(),
                })
                .await?;
        }
        info!("Seeded default products");
    }

    Ok(())
}

/// Make sure the `ADMIN_EMAIL` account exists and is an admin
///
/// An existing account keeps its password unless `ADMIN_PASSWORD` is set.
/// A new account without `ADMIN_PASSWORD` gets a generated one, logged once.
pub async fn ensure_admin(pool: &PgPool, config: &AppConfig) {
    let Some(email) = config.admin_email.as_deref() else {
        return;
    };
    if let Err(e) = ensure_admin_account(pool, config, &email.to_lowercase()).await {
        error!("Failed to ensure admin user: {}", e);
    }
}

async fn ensure_admin_account(pool: &PgPool, config: &AppConfig, email: &str) -> Result<()> {
    let users = UserRepository::new(pool.clone());
    let first_name = config.admin_first_name.as_str();
    let last_name = config.admin_last_name.as_str();

    if let Some(user) = users.find_by_email(email).await? {
        users
            .promote(user.id, Role::Admin, first_name, last_name)
            .await?;
        if let Some(password) = &config.admin_password {
            users
                .update_password(user.id, &hash_password(password)?)
                .await?;
        }
        info!("Admin user ensured (existing): {}", email);
        return Ok(());
    }

    let (password, generated) = match &config.admin_password {
        Some(password) => (password.clone(), false),
        None => (generate_password(), true),
    };

    users
        .create(&NewUser {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            password_hash: hash_password(&password)?,
            role: Role::Admin,
        })
        .await?;
    info!("Admin user created: {}", email);
    if generated {
        warn!("Temporary admin password: {}", password);
    }

    Ok(())
}
