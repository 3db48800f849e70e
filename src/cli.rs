//! CLI: check documents, validate JSON inputs, merge and populate schemas.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;

use schema_enforcer::compile::compile_document_at;
use schema_enforcer::populate::params_from_json;
use schema_enforcer::{CompileOptions, Compilation, Exception, Major, Schema, SchemaId, Value};

use crate::config::Settings;
use crate::jq_exec::JqFilter;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile OpenAPI schemas and validate, merge or populate values against them
#[derive(Parser, Debug)]
#[command(name = "schema-enforcer")]
pub struct CommandLineInterface {
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// compile every schema of a document and report diagnostics
    Check(CheckCmd),
    /// validate JSON inputs against one schema of a document
    Validate(ValidateCmd),
    /// merge several schemas of a document and print the result
    Merge(MergeCmd),
    /// populate a value from parameters and print it
    Populate(PopulateCmd),
}

#[derive(Args, Debug, Clone)]
struct DocumentSettings {
    /// OpenAPI document (JSON)
    #[arg(long, short)]
    document: PathBuf,

    /// OpenAPI major version (2 or 3); read from the document when omitted
    #[arg(long)]
    major: Option<u8>,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JQ pre-process filter for each document; every output is validated
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct CheckCmd {
    #[command(flatten)]
    document: DocumentSettings,

    /// JSON pointer to an extra schema to compile (e.g. /paths/~1pets/get/responses/200/schema)
    #[arg(long)]
    pointer: Vec<String>,

    /// treat warnings as errors
    #[arg(long)]
    warnings_as_errors: bool,
}

#[derive(clap::Parser, Debug)]
struct ValidateCmd {
    #[command(flatten)]
    document: DocumentSettings,

    /// JSON pointer to the schema to validate against
    #[arg(long, short)]
    pointer: String,

    #[command(flatten)]
    input_settings: InputSettings,
}

#[derive(clap::Parser, Debug)]
struct MergeCmd {
    #[command(flatten)]
    document: DocumentSettings,

    /// JSON pointers to the schemas to merge, in order
    #[arg(long, short, num_args = 1.., required = true)]
    pointer: Vec<String>,

    /// let later discriminators replace earlier ones
    #[arg(long)]
    overwrite_discriminator: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct PopulateCmd {
    #[command(flatten)]
    document: DocumentSettings,

    /// JSON pointer to the schema to populate
    #[arg(long, short)]
    pointer: String,

    /// JSON object of parameters
    #[arg(long)]
    params: Option<PathBuf>,

    /// JSON value to start from
    #[arg(long)]
    value: Option<PathBuf>,

    /// maximum schema depth to populate
    #[arg(long)]
    depth: Option<usize>,
}

/// A loaded document compiled together with the schemas at some pointers.
struct Loaded {
    compilation: Compilation,
    ids: Vec<Option<SchemaId>>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl DocumentSettings {
    fn load(&self, settings: &Settings, pointers: &[&str]) -> Result<Loaded> {
        let document: serde_json::Value = crate::path_de::read_json(&self.document)?;
        let major = match self.major {
            Some(n) => Major::try_from(n).map_err(anyhow::Error::msg)?,
            None => settings.major_for(&document)?,
        };
        let (compilation, ids) = compile_document_at(&document, pointers, CompileOptions::new(major));
        tracing::debug!(document = %self.document.display(), schemas = compilation.schemas.len(), "compiled document");
        Ok(Loaded { compilation, ids })
    }
}

impl Loaded {
    /// Schema at the `index`th pointer. It must exist and have compiled
    /// cleanly.
    fn schema(&self, index: usize, pointer: &str) -> Result<Schema<'_>> {
        let Some(id) = self.ids.get(index).copied().flatten() else {
            bail!("no schema at {pointer}");
        };
        let schema = self.compilation.schemas.schema(id);
        if let Some(errors) = schema.exception() {
            bail!("schema at {pointer} has errors:\n{errors}");
        }
        Ok(schema)
    }
}

impl InputSettings {
    /// Every value to validate, labelled by where it came from.
    fn load(&self) -> Result<Vec<(String, serde_json::Value)>> {
        let filter = self.jq_expr.as_deref().map(JqFilter::new).transpose()?;
        let mut out = Vec::new();
        for source_path in resolve_file_path_patterns(&self.input)? {
            let label = source_path.to_string_lossy().to_string();
            let documents: Vec<(String, serde_json::Value)> = if self.ndjson {
                let source = std::fs::read(&source_path).with_context(|| format!("failed to read {label}"))?;
                source
                    .split(|b| *b == b'\n')
                    .enumerate()
                    .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
                    .map(|(index, line)| {
                        let value = crate::path_de::from_slice_with_path::<serde_json::Value>(line)
                            .with_context(|| format!("failed to parse {label}:{}", index + 1))?;
                        Ok((format!("{label}:{}", index + 1), value))
                    })
                    .collect::<Result<_>>()?
            } else {
                vec![(label.clone(), crate::path_de::read_json(&source_path)?)]
            };
            for (label, document) in documents {
                match &filter {
                    None => out.push((label, document)),
                    Some(filter) => {
                        let outputs = filter
                            .apply(&document)
                            .with_context(|| format!("failed to apply jq expression to {label}"))?;
                        out.extend(outputs.into_iter().enumerate().map(|(i, v)| (format!("{label}[{i}]"), v)));
                    }
                }
            }
        }
        Ok(out)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    /// Run the command; `Ok(false)` means the inputs did not pass.
    pub fn run(&self) -> Result<bool> {
        let settings = Settings::load(self.config.as_deref())?;
        match &self.cmd {
            Command::Check(cmd) => cmd.run(&settings),
            Command::Validate(cmd) => cmd.run(&settings),
            Command::Merge(cmd) => cmd.run(&settings),
            Command::Populate(cmd) => cmd.run(&settings),
        }
    }
}

impl CheckCmd {
    fn run(&self, settings: &Settings) -> Result<bool> {
        let pointers: Vec<&str> = self.pointer.iter().map(String::as_str).collect();
        let loaded = self.document.load(settings, &pointers)?;
        let Compilation { schemas, errors, warnings } = &loaded.compilation;
        if let Some(warnings) = warnings {
            eprintln!("{}", warnings.to_string().yellow());
        }
        if let Some(errors) = errors {
            eprintln!("{}", errors.to_string().red());
        }
        let strict = self.warnings_as_errors || settings.warnings_as_errors;
        let passed = errors.is_none() && !(strict && warnings.is_some());
        if passed {
            println!("{} {} schemas compiled", "✔".green(), schemas.names().count());
        }
        Ok(passed)
    }
}

impl ValidateCmd {
    fn run(&self, settings: &Settings) -> Result<bool> {
        let loaded = self.document.load(settings, &[self.pointer.as_str()])?;
        let schema = loaded.schema(0, &self.pointer)?;
        let inputs = self.input_settings.load()?;

        let results: Vec<(&str, Option<Exception>)> = inputs
            .par_iter()
            .map(|(label, json)| (label.as_str(), check_value(schema, json)))
            .collect();

        let mut failed = 0;
        for (label, error) in &results {
            match error {
                None => println!("{} {label}", "✔".green()),
                Some(error) => {
                    failed += 1;
                    println!("{} {label}", "✘".red());
                    println!("{}", error.to_string().red());
                }
            }
        }
        tracing::debug!(inputs = results.len(), failed, "validation finished");
        Ok(failed == 0)
    }
}

/// Deserialize a wire value and validate the result.
fn check_value(schema: Schema<'_>, json: &serde_json::Value) -> Option<Exception> {
    let outcome = schema.deserialize(&Value::from_json(json));
    match outcome.error {
        Some(error) => Some(error),
        None => schema.validate(&outcome.value),
    }
}

impl MergeCmd {
    fn run(&self, settings: &Settings) -> Result<bool> {
        let pointers: Vec<&str> = self.pointer.iter().map(String::as_str).collect();
        let loaded = self.document.load(settings, &pointers)?;
        let schemas = pointers
            .iter()
            .enumerate()
            .map(|(index, pointer)| loaded.schema(index, pointer))
            .collect::<Result<Vec<_>>>()?;

        let mut options = settings.merge_options();
        options.overwrite_discriminator |= self.overwrite_discriminator;
        let outcome = schema_enforcer::merge(&schemas, options)?;
        let Some(merged) = outcome.value else {
            if let Some(error) = outcome.error {
                eprintln!("{}", error.to_string().red());
            }
            return Ok(false);
        };
        let rendered = serde_json::to_string_pretty(&merged.schema().to_definition())?;
        write_output(self.out.as_deref(), &rendered)?;
        Ok(true)
    }
}

impl PopulateCmd {
    fn run(&self, settings: &Settings) -> Result<bool> {
        let loaded = self.document.load(settings, &[self.pointer.as_str()])?;
        let schema = loaded.schema(0, &self.pointer)?;

        let params = match &self.params {
            Some(file) => params_from_json(&crate::path_de::read_json::<serde_json::Value>(file)?)?,
            None => Default::default(),
        };
        let value = match &self.value {
            Some(file) => {
                let json: serde_json::Value = crate::path_de::read_json(file)?;
                Some(schema.deserialize(&Value::from_json(&json)).into_result()?)
            }
            None => None,
        };
        let mut options = settings.populate.clone();
        if let Some(depth) = self.depth {
            options.depth = depth;
        }

        let outcome = schema.populate(&params, value, &options);
        if let Some(warning) = &outcome.warning {
            eprintln!("{}", warning.to_string().yellow());
        }
        if let Some(error) = &outcome.error {
            eprintln!("{}", error.to_string().red());
            return Ok(false);
        }
        let json = match outcome.value {
            Some(value) => schema.serialize(&value).into_result()?.to_json(),
            None => serde_json::Value::Null,
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
        Ok(true)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_output(out: Option<&Path>, contents: &str) -> Result<()> {
    let Some(out) = out else {
        println!("{contents}");
        return Ok(());
    };
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, contents).with_context(|| format!("failed to write {}", out.display()))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if !has_glob_chars(pattern) {
            out.push(PathBuf::from(pattern));
            continue;
        }
        let before = out.len();
        for entry in glob::glob(pattern)? {
            out.push(entry?);
        }
        if out.len() == before {
            bail!("glob pattern matched no files: {pattern}");
        }
    }
    Ok(out)
}

// ---- Tests ---- //
