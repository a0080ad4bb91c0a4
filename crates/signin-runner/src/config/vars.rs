//! Placeholder expansion for the templated fields of a flow config.
//!
//! Only `target.url` and the credentials are expanded. `${name}` reads a
//! variable given on the command line (or its declared default), `${env.NAME}`
//! reads the process environment, which is where passwords should come from.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Values supplied for a run, usually from `--var name=value`.
#[derive(Clone, Default)]
pub struct Vars {
    values: BTreeMap<String, String>,
}

// Values may be secrets; only names are shown.
impl fmt::Debug for Vars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Parse `name=value` pairs. The value may itself contain `=`.
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        pairs.iter().try_fold(Self::new(), |vars, pair| {
            let pair = pair.as_ref();
            match pair.split_once('=') {
                Some((name, value)) if !name.is_empty() => Ok(vars.set(name, value)),
                _ => Err(Error::Config(format!(
                    "invalid variable '{}', expected name=value",
                    pair
                ))),
            }
        })
    }

    /// Expand every placeholder in `template`. Undeclared names and
    /// unterminated placeholders are errors.
    pub fn expand(&self, template: &str, decls: &HashMap<String, VarDecl>) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find("${") {
            out.push_str(&rest[..open]);
            let inner = &rest[open + 2..];
            let close = inner.find('}').ok_or_else(|| {
                Error::Config(format!("unterminated placeholder in '{}'", template))
            })?;
            out.push_str(&self.lookup(&inner[..close], decls)?);
            rest = &inner[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn lookup(&self, name: &str, decls: &HashMap<String, VarDecl>) -> Result<String> {
        if let Some(key) = name.strip_prefix("env.") {
            return std::env::var(key)
                .map_err(|_| Error::Config(format!("environment variable {} is not set", key)));
        }
        if let Some(value) = self.get(name) {
            return Ok(value.to_string());
        }
        match decls.get(name) {
            Some(VarDecl {
                default: Some(default),
                ..
            }) => Ok(default.clone()),
            Some(decl) if decl.required => {
                Err(Error::Config(format!("missing required variable: {}", name)))
            }
            Some(_) => Ok(String::new()),
            None => Err(Error::Config(format!("undeclared variable: {}", name))),
        }
    }
}

/// A variable declared under `vars:` in a flow config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VarDecl {
    #[serde(default)]
    pub required: bool,
    pub default: Option<String>,
    pub description: Option<String>,
}
