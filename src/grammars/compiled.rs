use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use crate::grammars::raw::RuleDefinition;
use crate::grammars::regex::Regex;
use crate::grammars::rule::GrammarRule;
use crate::token::{is_valid_rule_name, token_fragment};

/// Rule ids are `u16`
const MAX_RULES: usize = u16::MAX as usize + 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u16);

impl Deref for RuleId {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl RuleId {
    #[inline]
    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// A rule after the registry has been built: resolved pattern, children and hooks.
/// Immutable from then on.
pub struct CompiledRule {
    id: RuleId,
    name: String,
    /// `None` for container rules which never match by themselves
    pattern: Option<Regex>,
    pub(crate) children: Vec<RuleId>,
    hooks: Box<dyn GrammarRule>,
}

impl CompiledRule {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The self-pattern with every `<<name>>` template already resolved
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// Child rules, in the order they scan the parent's working text
    pub fn children(&self) -> &[RuleId] {
        &self.children
    }

    pub(crate) fn hooks(&self) -> &dyn GrammarRule {
        self.hooks.as_ref()
    }
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("children", &self.children)
            .finish()
    }
}

/// Discovery, template resolution and regex compilation of the registered rules.
///
/// Templates can only be resolved once every rule is known since references can point
/// forward or to each other.
pub(crate) fn compile_rules(
    definitions: Vec<RuleDefinition>,
) -> Result<(Vec<CompiledRule>, HashMap<String, RuleId>), GrammarError> {
    if definitions.len() > MAX_RULES {
        return Err(GrammarError::TooManyRules {
            count: definitions.len(),
        });
    }

    // 1. discovery
    let mut rule_id_by_name = HashMap::with_capacity(definitions.len());
    for (idx, def) in definitions.iter().enumerate() {
        if !is_valid_rule_name(&def.name) {
            return Err(GrammarError::InvalidRuleName {
                name: def.name.clone(),
            });
        }
        if rule_id_by_name
            .insert(def.name.clone(), RuleId(idx as u16))
            .is_some()
        {
            return Err(GrammarError::DuplicateRule {
                name: def.name.clone(),
            });
        }
    }

    // 2. templates
    let raw_patterns: HashMap<&str, Option<&str>> = definitions
        .iter()
        .map(|def| (def.name.as_str(), def.pattern.as_deref()))
        .collect();
    let mut resolved_patterns = Vec::with_capacity(definitions.len());
    for def in &definitions {
        let resolved = match &def.pattern {
            Some(raw) => {
                let mut stack = vec![def.name.as_str()];
                let resolved = resolve_templates(raw, &raw_patterns, &mut stack).map_err(
                    |reference| GrammarError::UnresolvedTemplate {
                        rule: def.name.clone(),
                        reference,
                    },
                )?;
                Some(resolved)
            }
            None => None,
        };
        resolved_patterns.push(resolved);
    }

    // 3. regexes
    let mut rules = Vec::with_capacity(definitions.len());
    for (idx, (def, resolved)) in definitions.into_iter().zip(resolved_patterns).enumerate() {
        let pattern = match (def.pattern, resolved) {
            (Some(raw), Some(resolved)) => {
                let regex =
                    Regex::new(resolved).map_err(|error| GrammarError::InvalidRegex {
                        rule: def.name.clone(),
                        pattern: raw,
                        error,
                    })?;
                Some(regex)
            }
            _ => None,
        };

        rules.push(CompiledRule {
            id: RuleId(idx as u16),
            name: def.name,
            pattern,
            children: Vec::new(),
            hooks: def.hooks,
        });
    }

    Ok((rules, rule_id_by_name))
}

/// Replaces every `<<name>>` with a group matching either the literal form of rule `name`
/// (its own pattern, templates expanded) or one of its tokens.
/// Returns the first unknown name as an error.
///
/// `stack` holds the rules being expanded: a reference back into it, or to a rule without a
/// pattern, only matches tokens. Text between `<<` and `>>` that is not a valid rule name is
/// left alone.
fn resolve_templates<'a>(
    pattern: &str,
    raw_patterns: &HashMap<&'a str, Option<&'a str>>,
    stack: &mut Vec<&'a str>,
) -> Result<String, String> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find("<<") {
        let after = &rest[start + 2..];
        let Some(end) = after.find(">>") else {
            break;
        };
        let name = &after[..end];
        if !is_valid_rule_name(name) {
            out.push_str(&rest[..start + 1]);
            rest = &rest[start + 1..];
            continue;
        }
        let Some((&key, &referenced)) = raw_patterns.get_key_value(name) else {
            return Err(name.to_owned());
        };

        out.push_str(&rest[..start]);
        out.push_str("(?:");
        match referenced {
            Some(inner) if !stack.contains(&key) => {
                stack.push(key);
                let literal = resolve_templates(inner, raw_patterns, stack);
                stack.pop();
                out.push_str(&literal?);
                out.push('|');
            }
            _ => {}
        }
        out.push_str(&token_fragment(name));
        out.push(')');
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Errors that can occur while building a grammar registry.
///
/// Every one of them is a grammar authoring bug: the registry is never usable until it's fixed.
#[derive(Debug)]
#[non_exhaustive]
pub enum GrammarError {
    /// Rule names must look like identifiers: `[A-Za-z_][A-Za-z0-9_-]*`
    InvalidRuleName { name: String },
    DuplicateRule { name: String },
    /// A `<<name>>` template refers to a rule that was never registered
    UnresolvedTemplate { rule: String, reference: String },
    InvalidRegex {
        rule: String,
        pattern: String,
        error: onig::Error,
    },
    /// The wiring refers to a rule that was never registered
    UnknownRule { name: String, line: usize },
    /// The wiring text is not well-formed
    MalformedWiring { line: usize, reason: String },
    UnknownRoot { name: String },
    /// More rules than a [`RuleId`] can address
    TooManyRules { count: usize },
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::InvalidRuleName { name } => write!(f, "invalid rule name '{}'", name),
            GrammarError::DuplicateRule { name } => {
                write!(f, "rule '{}' is registered more than once", name)
            }
            GrammarError::UnresolvedTemplate { rule, reference } => write!(
                f,
                "rule '{}' references unknown rule '<<{}>>'",
                rule, reference
            ),
            GrammarError::InvalidRegex {
                rule,
                pattern,
                error,
            } => write!(
                f,
                "invalid regex pattern '{}' in rule '{}': {}",
                pattern, rule, error
            ),
            GrammarError::UnknownRule { name, line } => {
                write!(f, "line {}: unknown rule '{}' in wiring", line, name)
            }
            GrammarError::MalformedWiring { line, reason } => {
                write!(f, "line {}: malformed wiring: {}", line, reason)
            }
            GrammarError::UnknownRoot { name } => write!(f, "unknown root rule '{}'", name),
            GrammarError::TooManyRules { count } => write!(
                f,
                "{} rules registered, at most {} are supported",
                count, MAX_RULES
            ),
        }
    }
}

impl std::error::Error for GrammarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GrammarError::InvalidRegex { error, .. } => Some(error),
            _ => None,
        }
    }
}
