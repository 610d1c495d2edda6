//! Seed the database with default shop settings and a sample catalog.
//!
//! Re-running is safe: products whose slug already exists are skipped and
//! settings an operator has customized are left alone.

use print_shop_commerce::db::{PRODUCT_SLUG_KEY, PgStore};
use print_shop_commerce::models::{ProductInput, ShopSettings};
use print_shop_commerce::store::{Catalog, RepositoryError, SettingsStore};
use print_shop_core::Money;

use super::{CommandError, connect};

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    price: i64,
    stock: u32,
    category: &'static str,
}

const PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        name: "Dragon Figurine",
        description: "A beautifully detailed dragon figurine, 3D printed with high-quality PLA filament. Perfect for tabletop gaming or display.",
        price: 2499,
        stock: 15,
        category: "Figurines",
    },
    SeedProduct {
        name: "Phone Stand",
        description: "Minimalist phone stand compatible with all smartphone sizes. Sleek geometric design.",
        price: 1299,
        stock: 30,
        category: "Accessories",
    },
    SeedProduct {
        name: "Geometric Planter",
        description: "Modern geometric planter for small succulents and herbs. Includes drainage hole.",
        price: 1899,
        stock: 20,
        category: "Home Decor",
    },
    SeedProduct {
        name: "Articulated Octopus",
        description: "Fully articulated octopus toy with flexible tentacles. A fun fidget toy and conversation starter.",
        price: 1599,
        stock: 25,
        category: "Toys",
    },
    SeedProduct {
        name: "Cable Organizer Set",
        description: "Set of 5 cable clips to keep your desk tidy. Adhesive-backed for easy installation.",
        price: 899,
        stock: 50,
        category: "Accessories",
    },
    SeedProduct {
        name: "Medieval Castle",
        description: "Detailed medieval castle model for tabletop RPGs. Multi-piece assembly, includes towers and walls.",
        price: 4999,
        stock: 8,
        category: "Figurines",
    },
];

/// What a seed run changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Whether default settings were written.
    pub settings_written: bool,
    /// Products inserted.
    pub created: usize,
    /// Products skipped because the slug exists.
    pub skipped: usize,
}

/// Seed settings and products into any store.
///
/// # Errors
///
/// Returns the first storage error other than a duplicate slug.
pub async fn seed<S>(store: &S) -> Result<SeedReport, RepositoryError>
where
    S: Catalog + SettingsStore,
{
    let mut report = SeedReport::default();

    if store.get_settings().await? == ShopSettings::default() {
        store
            .update_settings(&ShopSettings {
                description: "Quality 3D printed items for everyone".to_owned(),
                ..ShopSettings::default()
            })
            .await?;
        report.settings_written = true;
    }

    for product in PRODUCTS {
        let input = ProductInput {
            name: product.name.to_owned(),
            slug: None,
            description: product.description.to_owned(),
            price: Money::from_minor(product.price),
            stock: product.stock,
            category: product.category.to_owned(),
            visible: true,
        };
        match store.create_product(&input).await {
            Ok(created) => {
                tracing::info!(slug = %created.slug, "Created product");
                report.created += 1;
            }
            Err(e) if e.is_conflict_on(PRODUCT_SLUG_KEY) => {
                tracing::debug!(name = product.name, "Product exists, skipping");
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// Seed the configured database.
///
/// # Errors
///
/// Returns an error if `DATABASE_URL` is missing or a write fails.
pub async fn run() -> Result<(), CommandError> {
    let store = PgStore::new(connect().await?);
    let report = seed(&store).await?;

    tracing::info!(
        settings_written = report.settings_written,
        created = report.created,
        skipped = report.skipped,
        "Seeding complete!"
    );
    Ok(())
}
