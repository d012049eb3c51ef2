//! Octopus API interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - API key handling
//! - [`client`] - Resource source backed by the REST API
//! - [`http`] - HTTP utilities for REST API calls
//!
//! # Example
//!
//! ```ignore
//! use octoterra::octopus::{ApiKey, OctopusClient};
//!
//! let key = ApiKey::resolve(None)?;
//! let client = OctopusClient::new("https://octopus.example.com", key, Some("Spaces-1".into()), catalog)?;
//! let production = client.get("Environments", "Environments-1").await?;
//! ```

pub mod auth;
pub mod client;
pub mod http;

pub use auth::{ApiKey, API_KEY_ENV, API_KEY_HEADER};
pub use client::OctopusClient;
pub use http::OctopusHttpClient;
