//! `jq` pre-filters for CLI inputs, evaluated with jaq.
use anyhow::{anyhow, Result};
use jaq_core::{compile::Undefined, load, Compiler, Ctx, RcIter};
use jaq_json::Val;
use serde_json::Value;

/// A checked filter program. Every input document is run through it and
/// each output becomes one value to validate.
#[derive(Clone, Debug)]
pub struct JqFilter {
    source: String,
}

impl JqFilter {
    /// Parse and compile once up front so a bad filter fails before any
    /// input is read.
    pub fn new(source: &str) -> Result<Self> {
        let filter = Self { source: source.to_string() };
        filter.run(None)?;
        Ok(filter)
    }

    pub fn apply(&self, input: &Value) -> Result<Vec<Value>> {
        self.run(Some(input))
    }

    /// Compile the program and, given an input, run it.
    fn run(&self, input: Option<&Value>) -> Result<Vec<Value>> {
        let loader = load::Loader::new(jaq_std::defs().chain(jaq_json::defs()));
        let arena = load::Arena::default();
        let program = load::File { code: self.source.as_str(), path: () };

        let modules = loader.load(&arena, program).map_err(format_parse_errors)?;
        let filter = Compiler::default()
            .with_funs(jaq_std::funs().chain(jaq_json::funs()))
            .compile(modules)
            .map_err(format_undefined_errors)?;
        let Some(input) = input else {
            return Ok(Vec::new());
        };

        let inputs = RcIter::new(core::iter::empty());
        let outputs = filter.run((Ctx::new([], &inputs), Val::from(input.clone())));

        let mut values = Vec::new();
        for output in outputs {
            let output = output.map_err(|e| anyhow!("jq filter failed: {e:?}"))?;
            // Val renders as JSON text
            values.push(serde_json::from_str(&output.to_string())?);
        }
        Ok(values)
    }
}

fn format_parse_errors(errs: Vec<(load::File<&str, ()>, load::Error<&str>)>) -> anyhow::Error {
    let mut s = String::new();
    for (file, err) in errs {
        s.push_str(&format!("parse error: {err:?} in `{}`\n", file.code));
    }
    anyhow!(s)
}

fn format_undefined_errors(errs: Vec<(load::File<&str, ()>, Vec<(&str, Undefined)>)>) -> anyhow::Error {
    let mut s = String::new();
    for (file, list) in errs {
        for (name, undef) in list {
            s.push_str(&format!("undefined `{name}`: {undef:?} in `{}`\n", file.code));
        }
    }
    anyhow!(s)
}
