//! Shop-wide settings.

use serde::{Deserialize, Serialize};

use print_shop_core::{Currency, Money};

/// Shop name, currency and flat shipping fee.
///
/// Loaded once per request and passed into services explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopSettings {
    /// Shop display name.
    pub shop_name: String,
    /// Short description shown in emails and page headers.
    pub description: String,
    /// Currency for new orders.
    pub currency: Currency,
    /// Flat shipping fee added to every order.
    pub shipping_fee: Money,
}

impl Default for ShopSettings {
    fn default() -> Self {
        Self {
            shop_name: "3D Print Shop".to_owned(),
            description: "Quality 3D printed items".to_owned(),
            currency: Currency::usd(),
            shipping_fee: Money::from_minor(500),
        }
    }
}
