//! HTTP access to the membership service.
//!
//! DESIGN
//! ======
//! `api` owns the request path and the endpoint table, `types` the wire
//! DTOs, `error` the failure taxonomy. Only `api` touches the session.

pub mod api;
pub mod error;
pub mod types;

pub use api::ApiClient;
pub use error::ApiError;
