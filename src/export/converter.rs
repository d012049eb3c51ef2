//! Converters
//!
//! A converter resolves resources of one kind: it fetches the resource,
//! resolves every resource it depends on through the context, and registers
//! a deferred renderer plus the reference other resources will use.
//!
//! Resolution is idempotent per `(kind, id)`. A resource that is already
//! registered, or whose resolution is currently under way further up the
//! call chain, is skipped. The second check is what keeps reference cycles
//! (project -> deployment process -> project) from recursing forever. An id
//! the server does not have is remembered as missing and never asked for
//! again.

use super::mapper::{dependencies, BlockMapper, CatalogMapper};
use super::registry::{
    LabelPolicy, ReferenceLookup, Registry, RegistryEntry, RenderThunk, ResourceKey,
    SymbolicReference,
};
use super::rewriter::IdentifierShape;
use crate::error::{ExportError, Result};
use crate::hcl;
use crate::resource::catalog::{Catalog, EdgePolicy, ResourceDef};
use crate::resource::{fetch_pages, CancelToken, ResourceSource, DEFAULT_PAGE_SIZE};
use crate::sanitizer::resource_label;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Resolves resources of one kind
#[async_trait]
pub trait Converter: Send + Sync {
    fn kind(&self) -> &str;

    /// Resolve one resource and everything it depends on
    async fn resolve_by_id(&self, ctx: &mut ExportContext, id: &str) -> Result<()>;

    /// Resolve every resource of this kind
    async fn resolve_all(&self, ctx: &mut ExportContext) -> Result<()>;
}

/// Everything a converter needs, passed explicitly down the recursion
pub struct ExportContext {
    pub registry: Registry,
    source: Arc<dyn ResourceSource>,
    catalog: Arc<Catalog>,
    shapes: Arc<Vec<IdentifierShape>>,
    converters: HashMap<String, Arc<dyn Converter>>,
    in_flight: HashSet<ResourceKey>,
    skipped: HashSet<ResourceKey>,
    missing: HashSet<ResourceKey>,
    cancel: CancelToken,
    page_size: usize,
}

impl ExportContext {
    /// Build a context with one [`CatalogConverter`] per catalog kind
    pub fn new(source: Arc<dyn ResourceSource>, catalog: Arc<Catalog>) -> Result<Self> {
        let shapes = Arc::new(catalog.shapes()?);
        let converters = catalog
            .kinds
            .iter()
            .map(|(kind, def)| {
                let converter: Arc<dyn Converter> =
                    Arc::new(CatalogConverter::new(kind, Arc::new(def.clone())));
                (kind.clone(), converter)
            })
            .collect();

        Ok(Self {
            registry: Registry::default(),
            source,
            catalog,
            shapes,
            converters,
            in_flight: HashSet::new(),
            skipped: HashSet::new(),
            missing: HashSet::new(),
            cancel: CancelToken::new(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_label_policy(mut self, policy: LabelPolicy) -> Self {
        self.registry = Registry::new(policy);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the converter for one kind
    pub fn register_converter(&mut self, converter: Arc<dyn Converter>) {
        self.converters
            .insert(converter.kind().to_string(), converter);
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn converter(&self, kind: &str) -> Result<Arc<dyn Converter>> {
        self.converters
            .get(kind)
            .cloned()
            .ok_or_else(|| ExportError::UnknownKind(kind.to_string()))
    }

    /// True when `(kind, id)` needs no further work in this run
    pub fn is_resolved(&self, kind: &str, id: &str) -> bool {
        if self.registry.has(kind, id) {
            return true;
        }
        let key = ResourceKey::new(kind, id);
        self.in_flight.contains(&key) || self.skipped.contains(&key)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }

    /// Resolve one resource of any kind. `NotFound` is reported once per id
    /// from the source and from memory afterwards.
    pub async fn resolve(&mut self, kind: &str, id: &str) -> Result<()> {
        self.check_cancelled()?;
        let key = ResourceKey::new(kind, id);
        if self.missing.contains(&key) {
            return Err(ExportError::NotFound {
                kind: key.kind,
                id: key.id,
            });
        }

        let converter = self.converter(kind)?;
        let result = converter.resolve_by_id(self, id).await;
        if matches!(&result, Err(err) if err.is_not_found()) {
            self.missing.insert(key);
        }
        result
    }

    /// Resolve every resource of any kind
    pub async fn resolve_all(&mut self, kind: &str) -> Result<()> {
        self.check_cancelled()?;
        let converter = self.converter(kind)?;
        converter.resolve_all(self).await
    }

    /// Resolve a dependency of `from`, applying the edge's not-found policy
    pub async fn resolve_edge(
        &mut self,
        from: &ResourceKey,
        kind: &str,
        id: &str,
        edge: EdgePolicy,
    ) -> Result<()> {
        match self.resolve(kind, id).await {
            Err(err) if err.is_not_found() => match edge {
                EdgePolicy::Required => Err(ExportError::MissingDependency {
                    from: from.to_string(),
                    kind: kind.to_string(),
                    id: id.to_string(),
                }),
                EdgePolicy::Optional => {
                    tracing::warn!("{} refers to missing {} {}; skipping", from, kind, id);
                    Ok(())
                }
            },
            other => other,
        }
    }
}

/// Converter driven by a catalog definition
pub struct CatalogConverter {
    kind: String,
    def: Arc<ResourceDef>,
}

impl CatalogConverter {
    pub fn new(kind: &str, def: Arc<ResourceDef>) -> Self {
        Self {
            kind: kind.to_string(),
            def,
        }
    }

    /// The resolution protocol. `prefetched` is the item already read by
    /// [`Converter::resolve_all`], if any.
    async fn resolve_resource(
        &self,
        ctx: &mut ExportContext,
        id: &str,
        prefetched: Option<Value>,
    ) -> Result<()> {
        if ctx.is_resolved(&self.kind, id) {
            return Ok(());
        }

        let key = ResourceKey::new(&self.kind, id);
        ctx.in_flight.insert(key.clone());
        let result = self.convert(ctx, &key, prefetched).await;
        ctx.in_flight.remove(&key);
        result
    }

    async fn convert(
        &self,
        ctx: &mut ExportContext,
        key: &ResourceKey,
        prefetched: Option<Value>,
    ) -> Result<()> {
        let resource = match prefetched {
            Some(resource) => resource,
            None => {
                tracing::debug!("Fetching {}", key);
                ctx.source.get(&self.kind, &key.id).await?
            }
        };

        let Some(variant) = self.def.variant(&resource) else {
            tracing::debug!("{} is a built-in variant, not exported", key);
            ctx.skipped.insert(key.clone());
            return Ok(());
        };

        let deps = dependencies(
            &self.def,
            variant.discriminator.as_deref(),
            &resource,
            &ctx.shapes,
        );
        for dep in deps {
            ctx.resolve_edge(key, &dep.kind, &dep.id, dep.edge).await?;
        }

        let name = self.def.display_name(&resource, &key.id).to_string();
        let label = ctx
            .registry
            .claim_label(key, resource_label(&self.def.label_prefix, &name));
        let reference = SymbolicReference::for_resource(&variant.terraform_type, &label);
        let file_name = format!("{}.tf", label);

        let thunk = CatalogThunk {
            file_name: file_name.clone(),
            mapper: CatalogMapper::new(
                self.def.clone(),
                ctx.shapes.clone(),
                variant.terraform_type,
                variant.discriminator,
                label,
            ),
            resource,
        };

        tracing::info!("Exporting {} \"{}\" as {}", key, name, reference);
        ctx.registry
            .add(RegistryEntry::new(key.clone(), reference, file_name, thunk));
        Ok(())
    }
}

#[async_trait]
impl Converter for CatalogConverter {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn resolve_by_id(&self, ctx: &mut ExportContext, id: &str) -> Result<()> {
        self.resolve_resource(ctx, id, None).await
    }

    async fn resolve_all(&self, ctx: &mut ExportContext) -> Result<()> {
        let mut stream = fetch_pages(
            ctx.source.clone(),
            &self.kind,
            ctx.page_size,
            ctx.cancel.clone(),
        );

        let mut result = Ok(());
        while let Some(item) = stream.next().await {
            let resolved = match item {
                Ok(resource) => {
                    let id = resource
                        .get("Id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    match id {
                        Some(id) => self.resolve_resource(ctx, &id, Some(resource)).await,
                        None => {
                            tracing::warn!("Skipping {} item without an Id", self.kind);
                            Ok(())
                        }
                    }
                }
                Err(e) => Err(e),
            };
            if let Err(e) = resolved {
                result = Err(e);
                break;
            }
        }
        stream.finish().await;

        result?;
        ctx.check_cancelled()
    }
}

/// Deferred renderer for a catalog resource; owns the fetched JSON
struct CatalogThunk {
    file_name: String,
    mapper: CatalogMapper,
    resource: Value,
}

impl RenderThunk for CatalogThunk {
    fn render(self: Box<Self>, refs: &dyn ReferenceLookup) -> Result<String> {
        let blocks = self.mapper.map(&self.resource, refs);
        if blocks.is_empty() {
            return Err(ExportError::Render {
                file: self.file_name,
                message: "mapper produced no blocks".to_string(),
            });
        }
        Ok(hcl::to_string(&blocks))
    }
}
