//! Client library for the Entrelac cooperative membership service.
//!
//! SYSTEM CONTEXT
//! ==============
//! Members register, confirm their account, buy shares through a hosted
//! checkout, redeem gift codes and upload identity documents. Admins list
//! and export members. All of it goes through [`net::ApiClient`], which
//! authenticates with the bearer token held by [`session::Session`].
//!
//! `casing`, `categories`, `claims` and `toast` are small helpers the
//! client and its front ends share. `storage` backs the session with
//! either memory or one file per key.

pub mod casing;
pub mod categories;
pub mod claims;
pub mod config;
pub mod net;
pub mod session;
pub mod storage;
pub mod toast;

pub use categories::Category;
pub use config::{ClientConfig, ConfigError, Environment};
pub use net::{ApiClient, ApiError};
pub use session::{Session, SessionState};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use toast::{Toast, ToastKind, Toaster};
