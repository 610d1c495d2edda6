//! Checkout orchestrator.
//!
//! Validates a cart against live stock and prices, persists a `PENDING` order
//! with its items in one unit, creates a payment intent for the total and
//! links the two. Stock is checked here but only decremented once payment is
//! confirmed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use print_shop_core::{Email, Money, OrderId, OrderNumber, OrderStatus, ProductId};

use crate::config::OrderConfig;
use crate::db::ORDER_NUMBER_KEY;
use crate::error::ErrorKind;
use crate::models::{CustomerDetails, NewOrder, NewOrderItem, Order, ShopSettings};
use crate::payments::{GatewayError, IntentRequest, PaymentGateway};
use crate::store::{Catalog, OrderStore, RepositoryError};

/// Errors from checkout and payment retry.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart has no lines.
    #[error("cart is empty")]
    EmptyCart,

    /// A line asks for zero units.
    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity {
        /// Offending product.
        product_id: ProductId,
        /// Requested quantity.
        quantity: u32,
    },

    /// Customer name or email failed validation.
    #[error("invalid customer details: {0}")]
    InvalidCustomer(String),

    /// A line asks for more than is in stock.
    #[error("only {available} of {name} in stock, {requested} requested")]
    OutOfStock {
        /// Offending product.
        product_id: ProductId,
        /// Product name.
        name: String,
        /// Requested quantity (after merging duplicate lines).
        requested: u32,
        /// Current stock.
        available: u32,
    },

    /// A product does not exist or is hidden.
    #[error("product {0} is not available")]
    ProductUnavailable(ProductId),

    /// Order totals do not fit in the money type.
    #[error("order total out of range")]
    TotalOutOfRange,

    /// Every generated order number collided.
    #[error("could not allocate an order number after {0} attempts")]
    OrderNumberExhausted(u32),

    /// The gateway failed; the order stays `PENDING` without a reference.
    #[error("payment for order {order_number} could not be started: {source}")]
    Gateway {
        /// The order left waiting for a retry.
        order_number: OrderNumber,
        /// Gateway failure.
        #[source]
        source: GatewayError,
    },

    /// No order with that number.
    #[error("order not found")]
    NotFound,

    /// Payment retry is only possible for a `PENDING` order with no intent.
    #[error("order {order_number} cannot be retried (status {status})")]
    NotRetryable {
        /// Order number.
        order_number: OrderNumber,
        /// Current status.
        status: OrderStatus,
    },

    /// Storage failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CheckoutError {
    /// Error class for HTTP mapping.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyCart
            | Self::InvalidQuantity { .. }
            | Self::InvalidCustomer(_)
            | Self::OutOfStock { .. }
            | Self::ProductUnavailable(_)
            | Self::TotalOutOfRange
            | Self::NotRetryable { .. } => ErrorKind::Validation,
            Self::Gateway { .. } => ErrorKind::Gateway,
            Self::NotFound => ErrorKind::NotFound,
            Self::OrderNumberExhausted(_) => ErrorKind::Internal,
            Self::Repository(e) => e.kind(),
        }
    }
}

/// One requested cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CartLine {
    /// Product to buy.
    pub product_id: ProductId,
    /// Units requested.
    pub quantity: u32,
}

/// Customer details as submitted, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerInput {
    /// Full name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Shipping address, stored as given.
    #[serde(default)]
    pub address: Option<serde_json::Value>,
}

/// A checkout submission.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    /// Cart lines; duplicates are merged.
    pub items: Vec<CartLine>,
    /// Customer and shipping details.
    pub customer: CustomerInput,
}

/// What the browser needs to complete payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    /// New order id.
    pub order_id: OrderId,
    /// Customer-facing order number.
    pub order_number: OrderNumber,
    /// Payment intent client secret.
    pub client_secret: String,
    /// Order total in minor units.
    pub total: Money,
}

/// Checkout orchestrator.
#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<dyn Catalog>,
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: OrderConfig,
}

impl std::fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn validate_customer(input: CustomerInput) -> Result<CustomerDetails, CheckoutError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(CheckoutError::InvalidCustomer("name is required".to_owned()));
    }
    let email =
        Email::parse(&input.email).map_err(|e| CheckoutError::InvalidCustomer(e.to_string()))?;

    Ok(CustomerDetails {
        name: name.to_owned(),
        email,
        address: input
            .address
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
    })
}

/// Reject empty carts and zero quantities, then merge duplicate products
/// keeping first-seen order.
fn merge_lines(lines: &[CartLine]) -> Result<Vec<CartLine>, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(CheckoutError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or(
                    CheckoutError::InvalidQuantity {
                        product_id: line.product_id,
                        quantity: line.quantity,
                    },
                )?;
            }
            None => merged.push(*line),
        }
    }
    Ok(merged)
}

impl CheckoutService {
    /// Create the service.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: OrderConfig,
    ) -> Self {
        Self {
            catalog,
            orders,
            gateway,
            config,
        }
    }

    /// Turn a cart into a `PENDING` order with an attached payment intent.
    ///
    /// # Errors
    ///
    /// Validation errors leave nothing behind. `Gateway` means the order was
    /// persisted but has no intent yet; [`Self::retry_payment`] can finish it.
    #[instrument(skip(self, request, shop), fields(lines = request.items.len()))]
    pub async fn checkout(
        &self,
        request: CheckoutRequest,
        shop: &ShopSettings,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let lines = merge_lines(&request.items)?;
        let customer = validate_customer(request.customer)?;
        let items = self.snapshot_lines(&lines).await?;

        let new = NewOrder::new(customer, shop.currency.clone(), shop.shipping_fee, items)
            .ok_or(CheckoutError::TotalOutOfRange)?;
        let order = self.insert_with_unique_number(new).await?;

        info!(
            order_number = %order.order_number,
            total = order.total.minor(),
            "Order created"
        );

        self.start_payment(&order).await
    }

    /// Create an intent for a `PENDING` order whose earlier intent call failed.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown number, `NotRetryable` if the order already
    /// has an intent or has left `PENDING`.
    #[instrument(skip(self, order_number), fields(order_number = %order_number))]
    pub async fn retry_payment(
        &self,
        order_number: &OrderNumber,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let order = self
            .orders
            .find_by_number(order_number)
            .await?
            .ok_or(CheckoutError::NotFound)?;

        if order.status != OrderStatus::Pending || order.payment_reference.is_some() {
            return Err(CheckoutError::NotRetryable {
                order_number: order.order_number,
                status: order.status,
            });
        }

        self.start_payment(&order).await
    }

    async fn snapshot_lines(&self, lines: &[CartLine]) -> Result<Vec<NewOrderItem>, CheckoutError> {
        let ids: Vec<ProductId> = lines.iter().map(|line| line.product_id).collect();
        let products = self.catalog.get_products(&ids).await?;

        lines
            .iter()
            .map(|line| {
                let product = products
                    .iter()
                    .find(|p| p.id == line.product_id && p.visible)
                    .ok_or(CheckoutError::ProductUnavailable(line.product_id))?;

                if line.quantity > product.stock {
                    return Err(CheckoutError::OutOfStock {
                        product_id: product.id,
                        name: product.name.clone(),
                        requested: line.quantity,
                        available: product.stock,
                    });
                }

                Ok(NewOrderItem {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    quantity: line.quantity,
                    price_at_time: product.price,
                })
            })
            .collect()
    }

    async fn insert_with_unique_number(&self, mut new: NewOrder) -> Result<Order, CheckoutError> {
        let attempts = self.config.order_number_attempts.max(1);
        for attempt in 1..=attempts {
            match self.orders.insert_order(&new).await {
                Ok(order) => return Ok(order),
                Err(e) if e.is_conflict_on(ORDER_NUMBER_KEY) => {
                    warn!(
                        order_number = %new.order_number,
                        attempt,
                        "Order number collision, regenerating"
                    );
                    new.order_number = OrderNumber::generate();
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CheckoutError::OrderNumberExhausted(attempts))
    }

    async fn start_payment(&self, order: &Order) -> Result<CheckoutReceipt, CheckoutError> {
        let metadata = BTreeMap::from([
            ("order_id".to_owned(), order.id.to_string()),
            ("order_number".to_owned(), order.order_number.to_string()),
        ]);
        let request = IntentRequest {
            amount: order.total,
            currency: order.currency.clone(),
            metadata,
        };

        let intent = match self.gateway.create_intent(&request).await {
            Ok(intent) => intent,
            Err(source) => {
                warn!(
                    order_number = %order.order_number,
                    error = %source,
                    "Payment intent failed, order left pending for retry"
                );
                return Err(CheckoutError::Gateway {
                    order_number: order.order_number.clone(),
                    source,
                });
            }
        };

        self.orders
            .attach_payment_reference(order.id, &intent.id)
            .await
            .inspect_err(|e| {
                // The intent exists at the gateway but no order points at it.
                error!(
                    order_number = %order.order_number,
                    orphaned_intent = %intent.id,
                    error = %e,
                    "Payment intent created but not attached; cancel it at the gateway"
                );
            })?;

        info!(
            order_number = %order.order_number,
            payment_reference = %intent.id,
            "Payment intent attached"
        );

        Ok(CheckoutReceipt {
            order_id: order.id,
            order_number: order.order_number.clone(),
            client_secret: intent.client_secret,
            total: order.total,
        })
    }
}
