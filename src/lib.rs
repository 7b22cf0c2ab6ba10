//! Data layer for browsing Kubernetes enhancement proposals (KEPs) and
//! Gateway API enhancement proposals (GEPs) straight from GitHub.

pub mod bookmarks;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod insights;
pub mod proposals;
pub mod rate_limit;
pub mod transport;
pub mod view;

#[cfg(test)]
mod testing;

pub use error::{CatalogError, Result};
