//! Resource abstraction layer
//!
//! This module provides a data-driven approach to Octopus resources.
//! Resource definitions are loaded from JSON at compile time, allowing new
//! kinds to be exported without code changes.
//!
//! # Architecture
//!
//! - [`catalog`] - Loads resource definitions from embedded JSON
//! - [`source`] - The trait every resource backend implements
//! - [`fetcher`] - Streams a whole collection page by page
//! - [`cancel`] - Cancellation shared by a run and its fetches
//! - [`memory`] - In-memory backend for tests and dry runs
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let mut stream = fetch_pages(client, "Environments", 30, CancelToken::new());
//! while let Some(item) = stream.next().await {
//!     println!("{}", item?["Name"]);
//! }
//! ```

pub mod cancel;
pub mod catalog;
pub mod fetcher;
pub mod memory;
pub mod source;

pub use cancel::CancelToken;
pub use catalog::{extract_json_value, Catalog, EdgePolicy, ResourceDef};
pub use fetcher::{fetch_pages, PageStream, DEFAULT_PAGE_SIZE};
pub use memory::MemorySource;
pub use source::{Page, ResourceSource};
