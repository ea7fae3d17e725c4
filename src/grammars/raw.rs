use std::fmt;
use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::error::PhrasalResult;
use crate::grammars::compiled::GrammarError;
use crate::grammars::rule::{DefaultRule, GrammarRule, TemplateRule};
use crate::registry::GrammarRegistry;

/// A rule as registered, before templates are resolved and children are wired.
pub struct RuleDefinition {
    pub name: String,
    /// May contain `<<other_rule>>` templates
    pub pattern: Option<String>,
    pub hooks: Box<dyn GrammarRule>,
}

impl RuleDefinition {
    pub fn new(
        name: impl Into<String>,
        pattern: Option<String>,
        hooks: impl GrammarRule + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            pattern,
            hooks: Box::new(hooks),
        }
    }
}

impl fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .finish()
    }
}

/// The explicit registration list of a grammar. Rules are discovered in the order they are
/// registered and names must be unique.
///
/// ```ignore
/// let registry = RegistryBuilder::new()
///     .container("Root", DefaultRule)
///     .plain("word", r"\w+")
///     .build("Root", "Root:\n  - word")?;
/// ```
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    definitions: Vec<RuleDefinition>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule matching `pattern`
    pub fn rule(
        mut self,
        name: impl Into<String>,
        pattern: impl Into<String>,
        hooks: impl GrammarRule + 'static,
    ) -> Self {
        self.definitions
            .push(RuleDefinition::new(name, Some(pattern.into()), hooks));
        self
    }

    /// Registers a rule matching `pattern` with the default hooks
    pub fn plain(self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.rule(name, pattern, DefaultRule)
    }

    /// Registers a rule without a pattern: it only exists to hold children and hooks,
    /// typically the root.
    pub fn container(mut self, name: impl Into<String>, hooks: impl GrammarRule + 'static) -> Self {
        self.definitions
            .push(RuleDefinition::new(name, None, hooks));
        self
    }

    pub fn define(mut self, definition: RuleDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Builds the registry, wiring children with `wiring` starting from `root`.
    ///
    /// A rule may be wired under itself, but parses then fail with
    /// [`Error::RecursionLimit`](crate::Error::RecursionLimit) unless its matches shrink.
    pub fn build(self, root: &str, wiring: &str) -> Result<GrammarRegistry, GrammarError> {
        GrammarRegistry::compile(self.definitions, root, wiring)
    }
}

/// A rule of a data-only grammar
///
/// # Examples
/// ```json
/// { "name": "tag", "match": "#(?<name>\\w+)", "replace": "<TAG:${name}>" }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRule {
    pub name: String,
    /// Missing for container rules
    #[serde(rename(deserialize = "match"))]
    pub match_: Option<String>,
    /// Template for the modified text, see [`TemplateRule`]
    pub replace: Option<String>,
    /// Substitute the resolved text in the parent instead of a token
    pub inline: bool,
}

/// A grammar whose rules only use templates, loadable from JSON
///
/// # Examples
/// ```json
/// {
///   "name": "tags",
///   "root": "Root",
///   "rules": [
///     { "name": "Root" },
///     { "name": "spaces", "match": " {2,}", "replace": " " },
///     { "name": "tag", "match": "#(?<name>\\w+)", "replace": "<TAG:${name}>" }
///   ],
///   "wiring": "Root:\n  - spaces\n  - tag"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGrammar {
    #[serde(default)]
    pub name: String,
    pub root: String,
    #[serde(default)]
    pub rules: Vec<RawRule>,
    #[serde(default)]
    pub wiring: String,
}

impl RawGrammar {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> PhrasalResult<Self> {
        let file = File::open(&path)?;
        let raw_grammar = serde_json::from_reader(&file)?;
        Ok(raw_grammar)
    }

    pub fn from_json_str(json: &str) -> PhrasalResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The registration list (one [`TemplateRule`] per rule), the root name and the wiring
    fn into_parts(self) -> (RegistryBuilder, String, String) {
        let mut builder = RegistryBuilder::new();
        for rule in self.rules {
            let hooks = TemplateRule::new(rule.replace, rule.inline);
            builder = builder.define(RuleDefinition::new(rule.name, rule.match_, hooks));
        }
        (builder, self.root, self.wiring)
    }

    pub fn compile(self) -> Result<GrammarRegistry, GrammarError> {
        let (builder, root, wiring) = self.into_parts();
        builder.build(&root, &wiring)
    }
}
