//! Embedded-Reference Rewriter
//!
//! Octopus stores many cross-references as plain text inside step and action
//! property bags (`"Octopus.Action.AwsAccount.Variable": "Accounts-12"`),
//! sometimes inside JSON documents serialized into a string. These are found
//! by the shape of the identifier and swapped for Terraform interpolations.

use super::registry::ReferenceLookup;
use crate::error::{ExportError, Result};
use crate::hcl::escape_template;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;

/// The textual shape of one kind's identifiers, e.g. `Accounts-\d+`
#[derive(Debug, Clone)]
pub struct IdentifierShape {
    kind: String,
    pattern: Regex,
}

impl IdentifierShape {
    pub fn new(kind: &str, id_prefix: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"\b{}-\d+\b", regex::escape(id_prefix)))
            .map_err(|e| ExportError::Catalog(format!("Bad id prefix {}: {}", id_prefix, e)))?;
        Ok(Self {
            kind: kind.to_string(),
            pattern,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// Every identifier of `shape` found in the string leaves of `value`, in
/// document order, without duplicates
pub fn find_identifiers(value: &Value, shape: &IdentifierShape) -> Vec<String> {
    let mut found = Vec::new();
    collect_identifiers(value, shape, &mut found);
    found
}

fn collect_identifiers(value: &Value, shape: &IdentifierShape, found: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for m in shape.pattern.find_iter(s) {
                if !found.iter().any(|f| f == m.as_str()) {
                    found.push(m.as_str().to_string());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_identifiers(item, shape, found);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_identifiers(item, shape, found);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Snapshot of the interpolations for a set of shapes
pub struct Rewriter<'a> {
    shapes: Vec<&'a IdentifierShape>,
    replacements: HashMap<&'a str, HashMap<String, String>>,
}

impl<'a> Rewriter<'a> {
    /// Capture every known reference of the shapes' kinds
    pub fn new(shapes: Vec<&'a IdentifierShape>, refs: &dyn ReferenceLookup) -> Self {
        let replacements = shapes
            .iter()
            .map(|shape| {
                let table = refs
                    .all(shape.kind())
                    .into_iter()
                    .map(|(id, reference)| (id.to_string(), reference.interpolation()))
                    .collect();
                (shape.kind(), table)
            })
            .collect();

        Self {
            shapes,
            replacements,
        }
    }

    /// Turn `text` into template text: every known identifier becomes an
    /// interpolation and the literal text around it is escaped. Unknown
    /// identifiers stay as they are.
    pub fn rewrite_str<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let mut found: Vec<(usize, usize, &str)> = Vec::new();
        for shape in &self.shapes {
            let Some(table) = self.replacements.get(shape.kind()) else {
                continue;
            };
            if table.is_empty() {
                continue;
            }
            for m in shape.pattern.find_iter(text) {
                if let Some(interpolation) = table.get(m.as_str()) {
                    found.push((m.start(), m.end(), interpolation.as_str()));
                }
            }
        }
        if found.is_empty() {
            return escape_template(text);
        }

        // Overlaps between shapes go to the match that starts first
        found.sort_by_key(|&(start, end, _)| (start, std::cmp::Reverse(end)));
        let mut out = String::with_capacity(text.len() + 32);
        let mut pos = 0;
        for (start, end, interpolation) in found {
            if start < pos {
                continue;
            }
            out.push_str(&escape_template(&text[pos..start]));
            out.push_str(interpolation);
            pos = end;
        }
        out.push_str(&escape_template(&text[pos..]));
        Cow::Owned(out)
    }

    /// Rewrite every string leaf of `value` into template text; other leaves
    /// are copied as-is. Render the result with [`Expr::from_template_json`].
    ///
    /// [`Expr::from_template_json`]: crate::hcl::Expr::from_template_json
    pub fn rewrite_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.rewrite_str(s).into_owned()),
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.rewrite_value(item)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.rewrite_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::registry::{ReferenceTable, SymbolicReference};
    use serde_json::json;

    fn table() -> ReferenceTable {
        let mut refs = ReferenceTable::default();
        refs.insert("Kind", "Kind-42", SymbolicReference::new("ref.42"));
        refs.insert(
            "Accounts",
            "Accounts-1",
            SymbolicReference::new("octopusdeploy_aws_account.account_aws.id"),
        );
        refs
    }

    #[test]
    fn test_substring_is_replaced() {
        let shape = IdentifierShape::new("Kind", "Kind").unwrap();
        let refs = table();
        let rewriter = Rewriter::new(vec![&shape], &refs);

        assert_eq!(rewriter.rewrite_str("prefix Kind-42 suffix"), "prefix ${ref.42} suffix");
    }

    #[test]
    fn test_no_match_is_unchanged() {
        let shape = IdentifierShape::new("Kind", "Kind").unwrap();
        let refs = table();
        let rewriter = Rewriter::new(vec![&shape], &refs);

        let text = "nothing to see";
        assert!(matches!(rewriter.rewrite_str(text), Cow::Borrowed(_)));
        assert_eq!(rewriter.rewrite_str("Kind-7 is unknown"), "Kind-7 is unknown");
    }

    #[test]
    fn test_literal_interpolation_is_escaped_next_to_reference() {
        let accounts = IdentifierShape::new("Accounts", "Accounts").unwrap();
        let refs = table();
        let rewriter = Rewriter::new(vec![&accounts], &refs);

        assert_eq!(
            rewriter.rewrite_str("aws --profile ${HOME}/Accounts-1 %{x}"),
            "aws --profile $${HOME}/${octopusdeploy_aws_account.account_aws.id} %%{x}"
        );
        // Nothing to substitute, but the literal opener is still escaped
        assert_eq!(rewriter.rewrite_str("echo ${HOME}"), "echo $${HOME}");
    }

    #[test]
    fn test_overlapping_shapes_take_the_earlier_match() {
        let process = IdentifierShape::new("DeploymentProcesses", "deploymentprocess-Projects").unwrap();
        let projects = IdentifierShape::new("Projects", "Projects").unwrap();
        let mut refs = ReferenceTable::default();
        refs.insert("DeploymentProcesses", "deploymentprocess-Projects-1", SymbolicReference::new("process.id"));
        refs.insert("Projects", "Projects-1", SymbolicReference::new("project.id"));
        let rewriter = Rewriter::new(vec![&projects, &process], &refs);

        assert_eq!(
            rewriter.rewrite_str("deploymentprocess-Projects-1 Projects-1"),
            "${process.id} ${project.id}"
        );
    }

    #[test]
    fn test_longer_id_is_not_partially_matched() {
        let shape = IdentifierShape::new("Kind", "Kind").unwrap();
        let refs = table();
        let rewriter = Rewriter::new(vec![&shape], &refs);

        assert_eq!(rewriter.rewrite_str("Kind-420"), "Kind-420");
    }

    #[test]
    fn test_nested_values_and_serialized_documents() {
        let kind = IdentifierShape::new("Kind", "Kind").unwrap();
        let accounts = IdentifierShape::new("Accounts", "Accounts").unwrap();
        let refs = table();
        let rewriter = Rewriter::new(vec![&kind, &accounts], &refs);

        let value = json!({
            "Octopus.Action.AwsAccount.Variable": "Accounts-1",
            "Octopus.Action.Script.ScriptBody": "echo Kind-42",
            "Octopus.Action.Template.Parameters": "{\"account\":\"Accounts-1\"}",
            "Retries": 3,
            "Enabled": true,
            "List": ["Kind-42", null]
        });

        let rewritten = rewriter.rewrite_value(&value);
        assert_eq!(
            rewritten["Octopus.Action.AwsAccount.Variable"],
            "${octopusdeploy_aws_account.account_aws.id}"
        );
        assert_eq!(rewritten["Octopus.Action.Script.ScriptBody"], "echo ${ref.42}");
        assert_eq!(
            rewritten["Octopus.Action.Template.Parameters"],
            "{\"account\":\"${octopusdeploy_aws_account.account_aws.id}\"}"
        );
        assert_eq!(rewritten["Retries"], 3);
        assert_eq!(rewritten["Enabled"], true);
        assert_eq!(rewritten["List"], json!(["${ref.42}", null]));
    }

    #[test]
    fn test_find_identifiers_dedupes_in_order() {
        let shape = IdentifierShape::new("Accounts", "Accounts").unwrap();
        let value = json!({"a": "Accounts-2 and Accounts-1", "b": ["Accounts-2"], "c": 5});
        assert_eq!(find_identifiers(&value, &shape), vec!["Accounts-2", "Accounts-1"]);
    }

    #[test]
    fn test_prefix_with_dash_is_escaped() {
        let shape = IdentifierShape::new("DeploymentProcesses", "deploymentprocess-Projects").unwrap();
        let value = json!("deploymentprocess-Projects-3");
        assert_eq!(find_identifiers(&value, &shape), vec!["deploymentprocess-Projects-3"]);
    }
}
