//! octoterra
//!
//! Exports the configuration of an Octopus Deploy space as Terraform files,
//! one file per resource, with every cross-resource field rewritten into a
//! reference to the generated resource instead of a server-specific id.
//!
//! - [`resource`] - Catalog, resource sources and the paginated fetcher
//! - [`export`] - Registry, converters, rewriter and the flush stage
//! - [`octopus`] - REST client for a live server
//! - [`hcl`] - Minimal HCL writer
//! - [`sanitizer`] - Terraform-safe local names

pub mod error;
pub mod export;
pub mod hcl;
pub mod octopus;
pub mod resource;
pub mod sanitizer;

pub use error::{ExportError, Result};
pub use export::{run_export, ExportReport, ExportSettings, LabelPolicy};
pub use resource::{CancelToken, Catalog, MemorySource, ResourceSource};
