//! HTTP surface (§6): the only external interface besides the scheduler.

pub mod auth;
pub mod dto;
pub mod routes;

pub use routes::{build_router, AppState};
