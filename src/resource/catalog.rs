//! Resource Catalog - Load resource definitions from JSON
//!
//! Every Octopus resource kind the exporter understands is described in an
//! embedded JSON file: where its collection lives, what its ids look like,
//! which Terraform resource it becomes and how its fields map across.
//! Adding a kind is a data change, not a code change.

use crate::error::{ExportError, Result};
use crate::export::rewriter::IdentifierShape;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Embedded catalog (compiled into the binary)
const CATALOG_JSON: &str = include_str!("../resources/octopus.json");

/// Default field holding a resource's display name
fn default_name_field() -> String {
    "Name".to_string()
}

/// Whether a dangling dependency aborts the export or is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgePolicy {
    /// The dependency must exist; not-found aborts
    Required,
    /// Not-found is logged and the reference is omitted
    #[default]
    Optional,
}

/// Terraform type selection by a discriminator field
#[derive(Debug, Clone, Deserialize)]
pub struct VariantDef {
    /// Dot path of the discriminator, e.g. `Endpoint.CommunicationStyle`
    pub path: String,
    #[serde(default)]
    pub types: HashMap<String, String>,
    /// Discriminator values that are never exported
    #[serde(default)]
    pub skip: Vec<String>,
}

/// Field definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    /// Attribute name; fields without one only contribute a dependency edge
    #[serde(default)]
    pub name: Option<String>,
    pub path: String,
    /// Kind this field's id (or list of ids) points at
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub edge: EdgePolicy,
    /// Kinds whose ids may appear inside this field's free-form value
    #[serde(default)]
    pub embedded: Vec<String>,
    /// Value is never returned by the API and becomes a sensitive variable
    #[serde(default)]
    pub secret: bool,
    /// Restrict the field to these discriminator values
    #[serde(default)]
    pub only_for: Vec<String>,
}

impl FieldDef {
    /// Check whether this field applies to the resolved variant
    pub fn applies_to(&self, discriminator: Option<&str>) -> bool {
        if self.only_for.is_empty() {
            return true;
        }
        discriminator
            .map(|d| self.only_for.iter().any(|v| v == d))
            .unwrap_or(false)
    }
}

/// Nested block definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct BlockDef {
    pub name: String,
    pub path: String,
    /// Iterate an object as `{"Key": k, "Value": v}` entries
    #[serde(default)]
    pub map_entries: bool,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub blocks: Vec<BlockDef>,
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub collection: String,
    pub id_prefix: String,
    pub terraform_type: String,
    pub label_prefix: String,
    #[serde(default = "default_name_field")]
    pub name_field: String,
    /// Included when no explicit kinds are requested
    #[serde(default)]
    pub export_all: bool,
    #[serde(default)]
    pub variants: Option<VariantDef>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub blocks: Vec<BlockDef>,
}

/// The variant of one fetched resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVariant {
    pub terraform_type: String,
    pub discriminator: Option<String>,
}

impl ResourceDef {
    /// Pick the Terraform type for a resource, or `None` when the resource's
    /// variant is one that is never exported
    pub fn variant(&self, resource: &Value) -> Option<ResolvedVariant> {
        let Some(variants) = &self.variants else {
            return Some(ResolvedVariant {
                terraform_type: self.terraform_type.clone(),
                discriminator: None,
            });
        };

        let discriminator = extract_json_value(resource, &variants.path)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        if let Some(d) = &discriminator {
            if variants.skip.iter().any(|s| s == d) {
                return None;
            }
        }

        let terraform_type = discriminator
            .as_deref()
            .and_then(|d| variants.types.get(d))
            .cloned()
            .unwrap_or_else(|| {
                tracing::warn!(
                    "Unknown {} value {:?}, falling back to {}",
                    variants.path,
                    discriminator,
                    self.terraform_type
                );
                self.terraform_type.clone()
            });

        Some(ResolvedVariant {
            terraform_type,
            discriminator,
        })
    }

    /// Display name of a resource, falling back to its id
    pub fn display_name<'a>(&self, resource: &'a Value, id: &'a str) -> &'a str {
        extract_json_value(resource, &self.name_field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(id)
    }
}

/// Root structure of resources/octopus.json
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub kinds: BTreeMap<String, ResourceDef>,
}

impl Catalog {
    /// Load the catalog compiled into the binary
    pub fn embedded() -> Result<Self> {
        Self::from_json(CATALOG_JSON)
    }

    /// Parse and validate a catalog
    pub fn from_json(content: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(content)
            .map_err(|e| ExportError::Catalog(format!("Failed to parse catalog: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Every referenced kind must itself be defined
    fn validate(&self) -> Result<()> {
        fn check_fields(catalog: &Catalog, owner: &str, fields: &[FieldDef]) -> Result<()> {
            for field in fields {
                for target in field.reference.iter().chain(field.embedded.iter()) {
                    if !catalog.kinds.contains_key(target) {
                        return Err(ExportError::Catalog(format!(
                            "{} field {} references unknown kind {}",
                            owner, field.path, target
                        )));
                    }
                }
            }
            Ok(())
        }

        fn check_blocks(catalog: &Catalog, owner: &str, blocks: &[BlockDef]) -> Result<()> {
            for block in blocks {
                check_fields(catalog, owner, &block.fields)?;
                check_blocks(catalog, owner, &block.blocks)?;
            }
            Ok(())
        }

        for (kind, def) in &self.kinds {
            check_fields(self, kind, &def.fields)?;
            check_blocks(self, kind, &def.blocks)?;
        }
        Ok(())
    }

    /// Get a resource definition by kind
    pub fn get(&self, kind: &str) -> Result<&ResourceDef> {
        self.kinds
            .get(kind)
            .ok_or_else(|| ExportError::UnknownKind(kind.to_string()))
    }

    /// Kinds exported when the user does not name any
    pub fn export_all_kinds(&self) -> Vec<&str> {
        self.kinds
            .iter()
            .filter(|(_, def)| def.export_all)
            .map(|(kind, _)| kind.as_str())
            .collect()
    }

    /// Identifier shapes for every kind, used to find embedded references
    pub fn shapes(&self) -> Result<Vec<IdentifierShape>> {
        self.kinds
            .iter()
            .map(|(kind, def)| IdentifierShape::new(kind, &def.id_prefix))
            .collect()
    }
}

/// Extract a value from JSON using a dot-notation path
pub fn extract_json_value<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(item);
    }

    let mut current = item;
    for part in path.split('.') {
        // Handle array index
        current = match part.parse::<usize>() {
            Ok(idx) if current.is_array() => current.get(idx)?,
            _ => current.get(part)?,
        };
    }
    Some(current)
}
