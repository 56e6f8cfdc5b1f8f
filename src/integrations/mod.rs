//! HTTP 边界适配器

#[cfg(feature = "axum")]
pub mod axum;

#[cfg(feature = "client")]
pub mod client;
