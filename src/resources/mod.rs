//! Typed access to the helpdesk entities (devices, catalogs, users, tickets).

mod api;
pub mod keys;
pub mod models;

pub use api::HelpdeskApi;
pub use models::*;
