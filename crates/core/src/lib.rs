//! Print Shop Core - Shared domain types.
//!
//! This crate provides the types used across all Print Shop components:
//! - `commerce` - Order lifecycle reconciliation (checkout, webhooks, refunds)
//! - `storefront` - Public checkout and webhook endpoints
//! - `admin` - Operator endpoints (status changes, refunds, catalog edits)
//! - `cli` - Migrations and seed data
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. The order state machine lives here so that every
//! caller validates transitions against the same table.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, money, emails, order numbers and statuses
//! - [`lifecycle`] - The order transition table and its side effects

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod lifecycle;
pub mod types;

pub use lifecycle::*;
pub use types::*;

#[doc(hidden)]
pub use uuid;
