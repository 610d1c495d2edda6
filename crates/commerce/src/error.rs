//! Error classification shared by every commerce error type.
//!
//! Each layer has its own `thiserror` enum; [`ErrorKind`] is the coarse class
//! the HTTP layers map to a status code.

use serde::Serialize;

/// Coarse error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input or a disallowed state change. Nothing was mutated.
    Validation,
    /// The payment gateway failed or timed out.
    Gateway,
    /// A webhook failed authentication.
    Integrity,
    /// The referenced order or product does not exist.
    NotFound,
    /// Storage failure or broken invariant.
    Internal,
}
