//! HTTP middleware for the admin API.

pub mod auth;

pub use auth::RequireOperator;
pub use print_shop_commerce::http::{REQUEST_ID_HEADER, request_id_middleware};
