//! Shop settings singleton row.

use async_trait::async_trait;

use print_shop_core::{Currency, Money};

use super::{PgStore, RepositoryError};
use crate::models::ShopSettings;
use crate::store::SettingsStore;

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    shop_name: String,
    description: String,
    currency: Currency,
    shipping_fee: Money,
}

impl From<SettingsRow> for ShopSettings {
    fn from(row: SettingsRow) -> Self {
        Self {
            shop_name: row.shop_name,
            description: row.description,
            currency: row.currency,
            shipping_fee: row.shipping_fee,
        }
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn get_settings(&self) -> Result<ShopSettings, RepositoryError> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT shop_name, description, currency, shipping_fee \
             FROM shop_settings WHERE id = 'singleton'",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ShopSettings::from).unwrap_or_default())
    }

    async fn update_settings(&self, settings: &ShopSettings) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO shop_settings (id, shop_name, description, currency, shipping_fee) \
             VALUES ('singleton', $1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET \
               shop_name = EXCLUDED.shop_name, \
               description = EXCLUDED.description, \
               currency = EXCLUDED.currency, \
               shipping_fee = EXCLUDED.shipping_fee",
        )
        .bind(&settings.shop_name)
        .bind(&settings.description)
        .bind(&settings.currency)
        .bind(settings.shipping_fee)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
