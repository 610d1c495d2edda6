//! Print Shop Commerce - order lifecycle reconciliation.
//!
//! Turns a cart into a paid, stock-adjusted, notified order while tolerating
//! duplicated and out-of-order payment events from the gateway.
//!
//! # Components
//!
//! - [`ledger`] - Stock arithmetic (floor at zero, per-product atomic updates)
//! - [`store`] - Catalog, order and settings store traits plus an in-memory store
//! - [`db`] - `PostgreSQL` implementations of the store traits
//! - [`payments`] - Payment gateway adapter (Stripe) and webhook verification
//! - [`notifications`] - Fire-and-forget email dispatch
//! - [`services`] - Checkout orchestrator, webhook reconciler, status/refund handler
//! - `http` - Request ID middleware for the HTTP binaries (feature `http`)
//!
//! # Flow
//!
//! ```text
//! checkout ──▶ order store (PENDING) + gateway intent
//!                   │
//! webhook  ──▶ verify ─▶ CAS PENDING→PAID ─▶ stock decrement ─▶ confirmation email
//!
//! operator ──▶ plan transition ─▶ [gateway refund] ─▶ CAS ─▶ stock restore / shipping email
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod ledger;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod services;
pub mod store;

pub use error::ErrorKind;
