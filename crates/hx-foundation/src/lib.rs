//! Foundation crate providing common utilities and types shared across the workspace.
//!
//! This crate provides foundational functionality including:
//! - Error handling (`error` module)
//! - Configuration loading (`config` module)
//! - HTTP client utilities (`http` module)
//! - JSON tree helpers (`json` module)

pub mod config;
pub mod error;
pub mod http;
pub mod json;

// Re-export commonly used types
pub use config::{Config, ProxySettings};
pub use error::{ErrorContext, FoundationError, Result};
pub use http::HttpClient;
