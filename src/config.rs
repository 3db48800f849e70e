//! Settings file for the command line tool. Flags given on the command line
//! override what the file says.
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use schema_enforcer::{Major, MergeOptions, PopulateOptions};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
    /// OpenAPI major version; detected from the document when unset.
    pub major: Option<Major>,
    /// Fail `check` on warnings too.
    pub warnings_as_errors: bool,
    pub overwrite_discriminator: bool,
    pub populate: PopulateOptions,
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Settings> {
        let Some(file) = file else {
            return Ok(Settings::default());
        };
        let settings: Settings = crate::path_de::read_json(file)?;
        tracing::debug!(file = %file.display(), ?settings, "loaded settings");
        Ok(settings)
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions { overwrite_discriminator: self.overwrite_discriminator }
    }

    /// Major version for `document`: the configured one, else the
    /// document's `swagger`/`openapi` field.
    pub fn major_for(&self, document: &serde_json::Value) -> Result<Major> {
        if let Some(major) = self.major {
            return Ok(major);
        }
        detect_major(document).ok_or_else(|| {
            anyhow!("cannot tell the OpenAPI version: the document has neither \"swagger\" nor \"openapi\"; pass --major")
        })
    }
}

fn detect_major(document: &serde_json::Value) -> Option<Major> {
    let version = |field: &str| document.get(field).and_then(serde_json::Value::as_str);
    if version("swagger").is_some_and(|v| v.starts_with('2')) {
        return Some(Major::V2);
    }
    if version("openapi").is_some_and(|v| v.starts_with('3')) {
        return Some(Major::V3);
    }
    None
}

// ---- Tests ---- //
