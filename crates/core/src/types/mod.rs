//! Core types for Print Shop.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod order_number;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Currency, CurrencyError, Money};
pub use order_number::{OrderNumber, OrderNumberError};
pub use status::*;
