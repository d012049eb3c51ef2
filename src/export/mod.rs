//! Export engine
//!
//! Walks the resource graph reachable from the requested roots, registers
//! one deferred renderer per distinct resource, then renders and writes
//! every file once discovery has finished.
//!
//! # Architecture
//!
//! - [`converter`] - Per-kind resolution and the shared [`ExportContext`]
//! - [`registry`] - At-most-once entries and their symbolic references
//! - [`mapper`] - Catalog-driven `resource -> Block` mapping
//! - [`rewriter`] - Identifier substitution inside free-form properties
//! - [`flush`] - Writes the rendered files

pub mod converter;
pub mod flush;
pub mod mapper;
pub mod registry;
pub mod rewriter;

pub use converter::{CatalogConverter, Converter, ExportContext};
pub use flush::{flush, FlushOutcome, PROVIDER_FILE};
pub use registry::{
    LabelPolicy, ReferenceLookup, ReferenceTable, Registry, RegistryEntry, RenderThunk,
    RenderedFile, ResourceKey, SymbolicReference,
};
pub use rewriter::{IdentifierShape, Rewriter};

use crate::error::{ExportError, Result};
use crate::resource::{CancelToken, Catalog, ResourceSource, DEFAULT_PAGE_SIZE};
use std::path::PathBuf;
use std::sync::Arc;

/// Kind that `project_ids` roots belong to
pub const PROJECT_KIND: &str = "Projects";

/// What one export run covers and where it writes
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub dest: PathBuf,
    pub page_size: usize,
    pub label_policy: LabelPolicy,
    /// Kinds exported in full; empty means every `export_all` kind, unless
    /// `project_ids` is set
    pub kinds: Vec<String>,
    /// Individual projects exported with their dependencies
    pub project_ids: Vec<String>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            dest: PathBuf::from("."),
            page_size: DEFAULT_PAGE_SIZE,
            label_policy: LabelPolicy::default(),
            kinds: Vec::new(),
            project_ids: Vec::new(),
        }
    }
}

impl ExportSettings {
    /// Kinds to export in full, in order
    pub fn root_kinds<'a>(&'a self, catalog: &'a Catalog) -> Vec<&'a str> {
        if !self.kinds.is_empty() {
            return self.kinds.iter().map(String::as_str).collect();
        }
        if !self.project_ids.is_empty() {
            return Vec::new();
        }
        catalog.export_all_kinds()
    }
}

/// Outcome of one run
#[derive(Debug)]
pub struct ExportReport {
    /// Number of registered resources
    pub exported: usize,
    /// Files written, `provider.tf` included
    pub written: Vec<PathBuf>,
    /// First error from discovery, rendering or writing
    pub error: Option<ExportError>,
}

impl ExportReport {
    pub fn into_result(self) -> Result<Vec<PathBuf>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.written),
        }
    }
}

/// Discover, render and write everything `settings` asks for.
///
/// A discovery failure stops discovery but not output: whatever was
/// registered before the failure is still rendered and written, and the
/// failure is reported in [`ExportReport::error`].
pub async fn run_export(
    source: Arc<dyn ResourceSource>,
    catalog: Arc<Catalog>,
    settings: &ExportSettings,
    cancel: CancelToken,
) -> Result<ExportReport> {
    let mut ctx = ExportContext::new(source, catalog.clone())?
        .with_label_policy(settings.label_policy)
        .with_page_size(settings.page_size)
        .with_cancel(cancel);

    let discovery = discover(&mut ctx, &catalog, settings).await;
    if let Err(e) = &discovery {
        tracing::error!("Discovery stopped: {}", e);
    }

    let exported = ctx.registry.len();
    let files = ctx.registry.drain();
    let outcome = flush(files, &settings.dest)?;

    tracing::info!(
        "Exported {} resources into {} files under {}",
        exported,
        outcome.written.len(),
        settings.dest.display()
    );

    Ok(ExportReport {
        exported,
        written: outcome.written,
        error: discovery.err().or(outcome.first_error),
    })
}

async fn discover(ctx: &mut ExportContext, catalog: &Catalog, settings: &ExportSettings) -> Result<()> {
    for id in &settings.project_ids {
        tracing::info!("Exporting project {}", id);
        ctx.resolve(PROJECT_KIND, id).await?;
    }

    for kind in settings.root_kinds(catalog) {
        tracing::info!("Exporting all {}", kind);
        ctx.resolve_all(kind).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::MemorySource;
    use serde_json::json;

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::embedded().unwrap())
    }

    #[test]
    fn test_root_kinds() {
        let catalog = catalog();
        let mut settings = ExportSettings::default();
        assert!(settings.root_kinds(&catalog).contains(&"Environments"));
        assert!(!settings.root_kinds(&catalog).contains(&"DeploymentProcesses"));

        settings.project_ids = vec!["Projects-1".to_string()];
        assert!(settings.root_kinds(&catalog).is_empty());

        settings.kinds = vec!["Feeds".to_string()];
        assert_eq!(settings.root_kinds(&catalog), vec!["Feeds"]);
    }

    #[tokio::test]
    async fn test_partial_output_survives_discovery_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new()
            .with_kind(
                "Environments",
                (1..=5)
                    .map(|i| json!({"Id": format!("Environments-{}", i), "Name": format!("Env {}", i)}))
                    .collect(),
            )
            .fail_page_at("Environments", 2);
        let settings = ExportSettings {
            dest: dir.path().to_path_buf(),
            page_size: 2,
            kinds: vec!["Environments".to_string()],
            ..ExportSettings::default()
        };

        let report = run_export(Arc::new(source), catalog(), &settings, CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.exported, 2);
        assert_eq!(report.written.len(), 3);
        assert!(dir.path().join("environment_env_1.tf").exists());
        assert!(matches!(report.error, Some(ExportError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ExportSettings {
            dest: dir.path().to_path_buf(),
            kinds: vec!["Spaceships".to_string()],
            ..ExportSettings::default()
        };

        let report = run_export(Arc::new(MemorySource::new()), catalog(), &settings, CancelToken::new())
            .await
            .unwrap();

        assert!(matches!(report.error, Some(ExportError::UnknownKind(ref k)) if k == "Spaceships"));
        assert_eq!(report.written, vec![dir.path().join(PROVIDER_FILE)]);
    }
}
