//! Resource Registry
//!
//! Append-only store of everything discovered during a run. Each entry binds
//! a remote `(kind, id)` to the Terraform expression other blocks use to
//! reference it, and to a deferred renderer that produces the file text once
//! discovery is over.
//!
//! The registry does not deduplicate on its own. Converters check
//! [`Registry::has`] before adding, and because the registry is only ever
//! borrowed mutably by one driver, that check-then-add cannot interleave.

use crate::error::Result;
use crate::sanitizer::sanitize_name;
use std::collections::HashMap;
use std::fmt;

/// Registry uniqueness key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(kind: &str, id: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A Terraform expression resolving to another block's id at apply time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolicReference(String);

impl SymbolicReference {
    pub fn new(expression: &str) -> Self {
        Self(expression.to_string())
    }

    /// `<type>.<label>.id`
    pub fn for_resource(terraform_type: &str, label: &str) -> Self {
        Self(format!("{}.{}.id", terraform_type, label))
    }

    /// Bare traversal, for structured attributes
    pub fn expression(&self) -> &str {
        &self.0
    }

    /// `${...}` form, for use inside string literals
    pub fn interpolation(&self) -> String {
        format!("${{{}}}", self.0)
    }
}

impl fmt::Display for SymbolicReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read access to the references known so far
pub trait ReferenceLookup {
    fn lookup(&self, kind: &str, id: &str) -> Option<&SymbolicReference>;

    /// Every `(id, reference)` of one kind, in registration order
    fn all(&self, kind: &str) -> Vec<(&str, &SymbolicReference)>;
}

/// Deferred renderer for one registry entry.
///
/// Consumed by [`Registry::drain`], so it runs at most once. It receives the
/// complete reference table, never other entries' rendered text.
pub trait RenderThunk: Send {
    fn render(self: Box<Self>, refs: &dyn ReferenceLookup) -> Result<String>;
}

impl<F> RenderThunk for F
where
    F: FnOnce(&dyn ReferenceLookup) -> Result<String> + Send,
{
    fn render(self: Box<Self>, refs: &dyn ReferenceLookup) -> Result<String> {
        (*self)(refs)
    }
}

pub struct RegistryEntry {
    pub key: ResourceKey,
    pub reference: SymbolicReference,
    pub file_name: String,
    thunk: Box<dyn RenderThunk>,
}

impl RegistryEntry {
    pub fn new(
        key: ResourceKey,
        reference: SymbolicReference,
        file_name: String,
        thunk: impl RenderThunk + 'static,
    ) -> Self {
        Self {
            key,
            reference,
            file_name,
            thunk: Box::new(thunk),
        }
    }

    /// Entry whose renderer is a closure
    pub fn from_fn<F>(key: ResourceKey, reference: SymbolicReference, file_name: String, f: F) -> Self
    where
        F: FnOnce(&dyn ReferenceLookup) -> Result<String> + Send + 'static,
    {
        Self::new(key, reference, file_name, f)
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("key", &self.key)
            .field("reference", &self.reference)
            .field("file_name", &self.file_name)
            .finish_non_exhaustive()
    }
}

/// What to do when two resources sanitize to the same label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPolicy {
    /// Append the sanitized remote id to later claimants
    #[default]
    SuffixId,
    /// Keep the colliding label and only warn
    Keep,
}

/// One drained entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub key: ResourceKey,
    pub file_name: String,
    pub contents: String,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
    index: HashMap<ResourceKey, usize>,
    labels: HashMap<String, ResourceKey>,
    policy: LabelPolicy,
}

impl Registry {
    pub fn new(policy: LabelPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn has(&self, kind: &str, id: &str) -> bool {
        self.index.contains_key(&ResourceKey::new(kind, id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry. Callers must check [`Self::has`] first.
    pub fn add(&mut self, entry: RegistryEntry) {
        if self.index.contains_key(&entry.key) {
            tracing::warn!("{} registered twice; keeping the first entry", entry.key);
        } else {
            self.index.insert(entry.key.clone(), self.entries.len());
        }
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = RegistryEntry>) {
        for entry in entries {
            self.add(entry);
        }
    }

    /// Entries of one kind, in registration order
    pub fn entries(&self, kind: &str) -> impl Iterator<Item = &RegistryEntry> + '_ {
        let kind = kind.to_string();
        self.entries.iter().filter(move |e| e.key.kind == kind)
    }

    /// Reserve a label (and so a file name) for `key`.
    ///
    /// Labels are unique across the whole run because they double as file
    /// names. On collision the [`LabelPolicy`] decides.
    pub fn claim_label(&mut self, key: &ResourceKey, label: String) -> String {
        match self.labels.get(&label) {
            None => {
                self.labels.insert(label.clone(), key.clone());
                label
            }
            Some(owner) if owner == key => label,
            Some(owner) => match self.policy {
                LabelPolicy::Keep => {
                    tracing::warn!(
                        "{} and {} both export as {}; the later file wins",
                        owner,
                        key,
                        label
                    );
                    label
                }
                LabelPolicy::SuffixId => {
                    let base = format!("{}_{}", label, sanitize_name(&key.id));
                    let mut candidate = base.clone();
                    let mut counter = 2;
                    while self.labels.get(&candidate).is_some_and(|o| o != key) {
                        candidate = format!("{}_{}", base, counter);
                        counter += 1;
                    }
                    tracing::warn!(
                        "{} collides with {} on label {}; using {}",
                        key,
                        owner,
                        label,
                        candidate
                    );
                    self.labels.insert(candidate.clone(), key.clone());
                    candidate
                }
            },
        }
    }

    /// Snapshot of every reference registered so far
    pub fn references(&self) -> ReferenceTable {
        let mut table = ReferenceTable::default();
        for entry in &self.entries {
            table.insert(&entry.key.kind, &entry.key.id, entry.reference.clone());
        }
        table
    }

    /// Run every deferred renderer exactly once, in registration order.
    ///
    /// A failing renderer does not stop the others.
    pub fn drain(self) -> Vec<Result<RenderedFile>> {
        let table = self.references();
        tracing::debug!("Rendering {} entries", self.entries.len());

        self.entries
            .into_iter()
            .map(|entry| {
                let RegistryEntry {
                    key,
                    file_name,
                    thunk,
                    ..
                } = entry;
                thunk.render(&table).map(|contents| RenderedFile {
                    key,
                    file_name,
                    contents,
                })
            })
            .collect()
    }
}

impl ReferenceLookup for Registry {
    fn lookup(&self, kind: &str, id: &str) -> Option<&SymbolicReference> {
        self.index
            .get(&ResourceKey::new(kind, id))
            .map(|&i| &self.entries[i].reference)
    }

    fn all(&self, kind: &str) -> Vec<(&str, &SymbolicReference)> {
        self.entries(kind)
            .map(|e| (e.key.id.as_str(), &e.reference))
            .collect()
    }
}

/// Frozen `(kind, id) -> reference` map handed to renderers
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    order: Vec<ResourceKey>,
    references: HashMap<ResourceKey, SymbolicReference>,
}

impl ReferenceTable {
    /// First insert for a key wins
    pub fn insert(&mut self, kind: &str, id: &str, reference: SymbolicReference) {
        let key = ResourceKey::new(kind, id);
        if !self.references.contains_key(&key) {
            self.order.push(key.clone());
            self.references.insert(key, reference);
        }
    }
}

impl ReferenceLookup for ReferenceTable {
    fn lookup(&self, kind: &str, id: &str) -> Option<&SymbolicReference> {
        self.references.get(&ResourceKey::new(kind, id))
    }

    fn all(&self, kind: &str) -> Vec<(&str, &SymbolicReference)> {
        self.order
            .iter()
            .filter(|key| key.kind == kind)
            .filter_map(|key| self.references.get(key).map(|r| (key.id.as_str(), r)))
            .collect()
    }
}
