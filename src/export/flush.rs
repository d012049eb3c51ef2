//! Render/Flush
//!
//! Writes the drained registry to disk, one file per entry, plus the
//! `provider.tf` that every generated configuration needs.

use super::registry::RenderedFile;
use crate::error::{ExportError, Result};
use crate::hcl::{self, Block, Expr};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const PROVIDER_FILE: &str = "provider.tf";
const PROVIDER_SOURCE: &str = "OctopusDeployLabs/octopusdeploy";
const PROVIDER_VERSION: &str = "~> 0.22";

/// Result of writing one run's files
#[derive(Debug, Default)]
pub struct FlushOutcome {
    /// Paths written, in registry order, `provider.tf` last
    pub written: Vec<PathBuf>,
    /// First render or write failure; later ones are only logged
    pub first_error: Option<ExportError>,
}

impl FlushOutcome {
    fn record(&mut self, err: ExportError) {
        tracing::error!("{}", err);
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

/// Write every successfully rendered file into `dest`.
///
/// A failed render does not stop the others. `dest` is created if missing;
/// failing to create it is the only early return.
pub fn flush(files: Vec<Result<RenderedFile>>, dest: &Path) -> Result<FlushOutcome> {
    std::fs::create_dir_all(dest)?;

    let mut outcome = FlushOutcome::default();
    let mut owners: HashMap<String, String> = HashMap::new();

    for file in files {
        let file = match file {
            Ok(file) => file,
            Err(e) => {
                outcome.record(e);
                continue;
            }
        };

        if let Some(previous) = owners.insert(file.file_name.clone(), file.key.to_string()) {
            tracing::warn!(
                "{} overwrites {} written for {}",
                file.key,
                file.file_name,
                previous
            );
        }

        let path = dest.join(&file.file_name);
        match std::fs::write(&path, &file.contents) {
            Ok(()) => {
                tracing::debug!("Wrote {}", path.display());
                outcome.written.push(path);
            }
            Err(e) => outcome.record(ExportError::Render {
                file: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    let path = dest.join(PROVIDER_FILE);
    match std::fs::write(&path, provider_config()) {
        Ok(()) => outcome.written.push(path),
        Err(e) => outcome.record(e.into()),
    }

    Ok(outcome)
}

/// Terraform settings, the provider block and its input variables
pub fn provider_config() -> String {
    let terraform = Block::new("terraform").block(
        Block::new("required_providers").attribute(
            "octopusdeploy",
            Expr::Object(vec![
                ("source".to_string(), Expr::String(PROVIDER_SOURCE.to_string())),
                ("version".to_string(), Expr::String(PROVIDER_VERSION.to_string())),
            ]),
        ),
    );

    let provider = Block::new("provider")
        .with_label("octopusdeploy")
        .attribute("address", Expr::Traversal("var.octopus_server".to_string()))
        .attribute("api_key", Expr::Traversal("var.octopus_apikey".to_string()))
        .attribute("space_id", Expr::Traversal("var.octopus_space_id".to_string()));

    hcl::to_string(&[
        terraform,
        provider,
        input_variable("octopus_server", "The URL of the Octopus server", false),
        input_variable("octopus_apikey", "The API key used to access the Octopus server", true),
        input_variable("octopus_space_id", "The ID of the space to populate", false),
    ])
}

fn input_variable(name: &str, description: &str, sensitive: bool) -> Block {
    Block::new("variable")
        .with_label(name)
        .attribute("type", Expr::Traversal("string".to_string()))
        .attribute("nullable", Expr::Bool(false))
        .attribute("sensitive", Expr::Bool(sensitive))
        .attribute("description", Expr::String(description.to_string()))
}
