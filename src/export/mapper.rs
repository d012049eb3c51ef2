//! Block Mapper
//!
//! Turns one fetched resource into Terraform blocks using its catalog
//! definition, and lists the dependency edges that definition implies. Both
//! walks read the same field tables, so every reference that gets rendered
//! was also offered to the converter for resolution.

use super::registry::ReferenceLookup;
use super::rewriter::{find_identifiers, IdentifierShape, Rewriter};
use crate::hcl::{Block, Expr};
use crate::resource::catalog::{extract_json_value, BlockDef, EdgePolicy, FieldDef, ResourceDef};
use crate::sanitizer::sanitize_strict;
use serde_json::{json, Value};
use std::sync::Arc;

/// One dependency edge out of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub kind: String,
    pub id: String,
    pub edge: EdgePolicy,
}

/// Maps a resource and a reference resolver to blocks
pub trait BlockMapper: Send {
    fn map(&self, resource: &Value, refs: &dyn ReferenceLookup) -> Vec<Block>;
}

/// Collect every dependency edge of `resource`, in field order.
///
/// Embedded identifiers are always optional edges: text that merely looks
/// like an id must never abort an export.
pub fn dependencies(
    def: &ResourceDef,
    discriminator: Option<&str>,
    resource: &Value,
    shapes: &[IdentifierShape],
) -> Vec<Dependency> {
    let mut deps = Vec::new();
    collect_field_deps(&def.fields, discriminator, resource, shapes, &mut deps);
    collect_block_deps(&def.blocks, discriminator, resource, shapes, &mut deps);
    deps
}

fn push_dependency(deps: &mut Vec<Dependency>, kind: &str, id: &str, edge: EdgePolicy) {
    if let Some(existing) = deps.iter_mut().find(|d| d.kind == kind && d.id == id) {
        // A required edge anywhere makes the dependency required
        if edge == EdgePolicy::Required {
            existing.edge = EdgePolicy::Required;
        }
        return;
    }
    deps.push(Dependency {
        kind: kind.to_string(),
        id: id.to_string(),
        edge,
    });
}

fn collect_field_deps(
    fields: &[FieldDef],
    discriminator: Option<&str>,
    item: &Value,
    shapes: &[IdentifierShape],
    deps: &mut Vec<Dependency>,
) {
    for field in fields.iter().filter(|f| f.applies_to(discriminator)) {
        let Some(value) = extract_json_value(item, &field.path) else {
            continue;
        };

        if let Some(target) = &field.reference {
            for id in id_values(value) {
                push_dependency(deps, target, id, field.edge);
            }
        }

        for target in &field.embedded {
            let Some(shape) = shapes.iter().find(|s| s.kind() == target) else {
                continue;
            };
            for id in find_identifiers(value, shape) {
                push_dependency(deps, target, &id, EdgePolicy::Optional);
            }
        }
    }
}

fn collect_block_deps(
    blocks: &[BlockDef],
    discriminator: Option<&str>,
    item: &Value,
    shapes: &[IdentifierShape],
    deps: &mut Vec<Dependency>,
) {
    for block in blocks {
        for element in block_elements(block, item) {
            collect_field_deps(&block.fields, discriminator, &element, shapes, deps);
            collect_block_deps(&block.blocks, discriminator, &element, shapes, deps);
        }
    }
}

/// Ids held by a reference field: one string or a list of strings
fn id_values(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) if !s.is_empty() => vec![s.as_str()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => vec![],
    }
}

/// The values one nested block definition iterates over
fn block_elements(block: &BlockDef, item: &Value) -> Vec<Value> {
    match extract_json_value(item, &block.path) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) if block.map_entries => map
            .iter()
            .map(|(key, value)| json!({"Key": key, "Value": value}))
            .collect(),
        Some(value @ Value::Object(_)) => vec![value.clone()],
        _ => vec![],
    }
}

/// Catalog-driven mapper for one resource
pub struct CatalogMapper {
    def: Arc<ResourceDef>,
    shapes: Arc<Vec<IdentifierShape>>,
    terraform_type: String,
    discriminator: Option<String>,
    label: String,
}

impl CatalogMapper {
    pub fn new(
        def: Arc<ResourceDef>,
        shapes: Arc<Vec<IdentifierShape>>,
        terraform_type: String,
        discriminator: Option<String>,
        label: String,
    ) -> Self {
        Self {
            def,
            shapes,
            terraform_type,
            discriminator,
            label,
        }
    }

    fn map_fields(
        &self,
        fields: &[FieldDef],
        item: &Value,
        refs: &dyn ReferenceLookup,
        target: &mut Block,
        variables: &mut Vec<Block>,
    ) {
        for field in fields
            .iter()
            .filter(|f| f.applies_to(self.discriminator.as_deref()))
        {
            let Some(name) = field.name.as_deref() else {
                continue;
            };

            if field.secret {
                let variable = format!("{}_{}", self.label, sanitize_strict(name));
                target.push_attribute(name, Expr::Traversal(format!("var.{}", variable)));
                variables.push(secret_variable(&variable, name, &self.label));
                continue;
            }

            let Some(value) = extract_json_value(item, &field.path).filter(|v| !v.is_null())
            else {
                continue;
            };

            if let Some(kind) = &field.reference {
                if let Some(expr) = reference_expr(kind, value, refs) {
                    target.push_attribute(name, expr);
                }
            } else if !field.embedded.is_empty() {
                let shapes: Vec<&IdentifierShape> = self
                    .shapes
                    .iter()
                    .filter(|s| field.embedded.iter().any(|k| k == s.kind()))
                    .collect();
                let rewritten = Rewriter::new(shapes, refs).rewrite_value(value);
                target.push_attribute(name, Expr::from_template_json(&rewritten));
            } else {
                target.push_attribute(name, Expr::from_json(value));
            }
        }
    }

    fn map_blocks(
        &self,
        blocks: &[BlockDef],
        item: &Value,
        refs: &dyn ReferenceLookup,
        target: &mut Block,
        variables: &mut Vec<Block>,
    ) {
        for def in blocks {
            for element in block_elements(def, item) {
                let mut nested = Block::new(&def.name);
                self.map_fields(&def.fields, &element, refs, &mut nested, variables);
                self.map_blocks(&def.blocks, &element, refs, &mut nested, variables);
                target.blocks.push(nested);
            }
        }
    }
}

impl BlockMapper for CatalogMapper {
    fn map(&self, resource: &Value, refs: &dyn ReferenceLookup) -> Vec<Block> {
        let mut block = Block::new("resource")
            .with_label(&self.terraform_type)
            .with_label(&self.label);
        let mut variables = Vec::new();

        self.map_fields(&self.def.fields, resource, refs, &mut block, &mut variables);
        self.map_blocks(&self.def.blocks, resource, refs, &mut block, &mut variables);

        let mut blocks = Vec::with_capacity(variables.len() + 1);
        blocks.push(block);
        blocks.extend(variables);
        blocks
    }
}

/// A reference field rendered against the known references.
///
/// Unknown scalar references are omitted and unknown list elements dropped;
/// those are optional dependencies that did not exist on the server.
fn reference_expr(kind: &str, value: &Value, refs: &dyn ReferenceLookup) -> Option<Expr> {
    let resolve = |id: &str| {
        let found = refs.lookup(kind, id);
        if found.is_none() {
            tracing::debug!("No reference for {} {}, omitting", kind, id);
        }
        found.map(|r| Expr::Traversal(r.expression().to_string()))
    };

    match value {
        Value::String(id) => resolve(id.as_str()),
        Value::Array(items) => Some(Expr::List(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(resolve)
                .collect(),
        )),
        _ => None,
    }
}

fn secret_variable(variable: &str, attribute: &str, label: &str) -> Block {
    Block::new("variable")
        .with_label(variable)
        .attribute("type", Expr::Traversal("string".to_string()))
        .attribute("nullable", Expr::Bool(false))
        .attribute("sensitive", Expr::Bool(true))
        .attribute(
            "description",
            Expr::String(format!("The {} value for {}", attribute, label)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::registry::{ReferenceTable, SymbolicReference};
    use crate::hcl;
    use crate::resource::catalog::Catalog;

    fn fixture() -> (Catalog, Arc<Vec<IdentifierShape>>) {
        let catalog = Catalog::embedded().unwrap();
        let shapes = Arc::new(catalog.shapes().unwrap());
        (catalog, shapes)
    }

    #[test]
    fn test_account_dependencies_follow_field_order() {
        let (catalog, shapes) = fixture();
        let def = catalog.get("Accounts").unwrap();
        let account = json!({
            "Id": "Accounts-1",
            "AccountType": "AmazonWebServicesAccount",
            "EnvironmentIds": ["Environments-2", "Environments-1"],
            "TenantIds": []
        });

        let deps = dependencies(def, Some("AmazonWebServicesAccount"), &account, &shapes);
        let ids: Vec<&str> = deps.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["Environments-2", "Environments-1"]);
        assert!(deps.iter().all(|d| d.edge == EdgePolicy::Optional));
    }

    #[test]
    fn test_deployment_process_dependencies_include_embedded_ids() {
        let (catalog, shapes) = fixture();
        let def = catalog.get("DeploymentProcesses").unwrap();
        let process = json!({
            "Id": "deploymentprocess-Projects-1",
            "ProjectId": "Projects-1",
            "Steps": [{
                "Name": "Deploy",
                "Properties": {},
                "Actions": [{
                    "Name": "Deploy",
                    "WorkerPoolId": "WorkerPools-1",
                    "Properties": {"Octopus.Action.AwsAccount.Variable": "Accounts-3"},
                    "Packages": [{"PackageId": "app", "FeedId": "Feeds-2"}]
                }]
            }]
        });

        let deps = dependencies(def, None, &process, &shapes);
        let keys: Vec<(&str, &str, EdgePolicy)> = deps
            .iter()
            .map(|d| (d.kind.as_str(), d.id.as_str(), d.edge))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Projects", "Projects-1", EdgePolicy::Required),
                ("WorkerPools", "WorkerPools-1", EdgePolicy::Optional),
                ("Accounts", "Accounts-3", EdgePolicy::Optional),
                ("Feeds", "Feeds-2", EdgePolicy::Optional),
            ]
        );
    }

    #[test]
    fn test_tenant_map_entries() {
        let (catalog, shapes) = fixture();
        let def = catalog.get("Tenants").unwrap();
        let tenant = json!({
            "Id": "Tenants-1",
            "Name": "Acme",
            "ProjectEnvironments": {"Projects-1": ["Environments-1"]}
        });

        let deps = dependencies(def, None, &tenant, &shapes);
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().all(|d| d.edge == EdgePolicy::Required));

        let mut refs = ReferenceTable::default();
        refs.insert("Projects", "Projects-1", SymbolicReference::new("octopusdeploy_project.project_web.id"));
        refs.insert("Environments", "Environments-1", SymbolicReference::new("octopusdeploy_environment.environment_dev.id"));

        let mapper = CatalogMapper::new(
            Arc::new(def.clone()),
            shapes,
            "octopusdeploy_tenant".to_string(),
            None,
            "tenant_acme".to_string(),
        );
        let text = hcl::to_string(&mapper.map(&tenant, &refs));
        assert!(text.contains("project_id   = octopusdeploy_project.project_web.id"));
        assert!(text.contains("environments = [octopusdeploy_environment.environment_dev.id]"));
    }

    #[test]
    fn test_secret_fields_become_variables() {
        let (catalog, shapes) = fixture();
        let def = catalog.get("Accounts").unwrap();
        let account = json!({"Name": "AWS", "AccountType": "AmazonWebServicesAccount", "AccessKey": "AKIA"});

        let mapper = CatalogMapper::new(
            Arc::new(def.clone()),
            shapes,
            "octopusdeploy_aws_account".to_string(),
            Some("AmazonWebServicesAccount".to_string()),
            "account_aws".to_string(),
        );
        let blocks = mapper.map(&account, &ReferenceTable::default());

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0]
            .attributes
            .contains(&("secret_key".to_string(), Expr::Traversal("var.account_aws_secret_key".to_string()))));
        assert_eq!(blocks[1].block_type, "variable");
        assert_eq!(blocks[1].labels, vec!["account_aws_secret_key".to_string()]);
    }

    #[test]
    fn test_missing_optional_reference_is_omitted() {
        let (catalog, shapes) = fixture();
        let def = catalog.get("Accounts").unwrap();
        let account = json!({
            "Name": "Login",
            "AccountType": "UsernamePassword",
            "EnvironmentIds": ["Environments-1", "Environments-404"]
        });

        let mut refs = ReferenceTable::default();
        refs.insert("Environments", "Environments-1", SymbolicReference::new("env.one.id"));

        let mapper = CatalogMapper::new(
            Arc::new(def.clone()),
            shapes,
            "octopusdeploy_username_password_account".to_string(),
            Some("UsernamePassword".to_string()),
            "account_login".to_string(),
        );
        let block = &mapper.map(&account, &refs)[0];
        assert!(block
            .attributes
            .contains(&("environments".to_string(), Expr::List(vec![Expr::Traversal("env.one.id".to_string())]))));
        assert!(!block.attributes.iter().any(|(name, _)| name == "access_key"));
    }

    #[test]
    fn test_embedded_properties_are_rewritten() {
        let (catalog, shapes) = fixture();
        let def = catalog.get("DeploymentProcesses").unwrap();
        let process = json!({
            "ProjectId": "Projects-1",
            "Steps": [{
                "Name": "Run",
                "Properties": {"Octopus.Action.TargetRoles": "web"},
                "Actions": [{
                    "Name": "Run",
                    "ActionType": "Octopus.AwsRunScript",
                    "Properties": {
                        "Octopus.Action.AwsAccount.Variable": "Accounts-3",
                        "Octopus.Action.Script.ScriptBody": "aws s3 cp ${HOME}/app.zip s3://Accounts-3/"
                    }
                }]
            }]
        });

        let mut refs = ReferenceTable::default();
        refs.insert("Projects", "Projects-1", SymbolicReference::new("octopusdeploy_project.project_web.id"));
        refs.insert("Accounts", "Accounts-3", SymbolicReference::new("octopusdeploy_aws_account.account_aws.id"));

        let mapper = CatalogMapper::new(
            Arc::new(def.clone()),
            shapes,
            "octopusdeploy_deployment_process".to_string(),
            None,
            "deployment_process_web".to_string(),
        );
        let text = hcl::to_string(&mapper.map(&process, &refs));
        assert!(text.contains("project_id = octopusdeploy_project.project_web.id"));
        assert!(text.contains(
            "\"Octopus.Action.AwsAccount.Variable\" = \"${octopusdeploy_aws_account.account_aws.id}\""
        ));
        assert!(text.contains("\"Octopus.Action.TargetRoles\" = \"web\""));
        // Shell interpolation stays literal, the account id becomes a reference
        assert!(text.contains(
            "\"aws s3 cp $${HOME}/app.zip s3://${octopusdeploy_aws_account.account_aws.id}/\""
        ));
    }

    #[test]
    fn test_plain_fields_escape_template_openers() {
        let (catalog, shapes) = fixture();
        let def = catalog.get("Environments").unwrap();
        let environment = json!({"Name": "Production", "Description": "uses ${HOME} in bash"});

        let mapper = CatalogMapper::new(
            Arc::new(def.clone()),
            shapes,
            "octopusdeploy_environment".to_string(),
            None,
            "environment_production".to_string(),
        );
        let text = hcl::to_string(&mapper.map(&environment, &ReferenceTable::default()));
        assert!(text.contains("\"uses $${HOME} in bash\""));
        assert!(!text.contains("\"uses ${HOME}"));
    }
}
