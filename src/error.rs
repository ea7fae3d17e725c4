use std::fmt;
use std::io;

use crate::grammars::{GrammarError, HookError};

pub(crate) type PhrasalResult<T> = Result<T, Error>;

/// Which hook of a rule failed
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HookStage {
    Capture,
    Substitute,
    Resolve,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookStage::Capture => "on_capture",
            HookStage::Substitute => "on_substitute",
            HookStage::Resolve => "on_resolve",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during phrasal usage
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred when reading a grammar file
    Io(io::Error),

    /// JSON parsing failed when loading a grammar.
    Json(serde_json::Error),

    /// The grammar could not be built.
    Grammar(GrammarError),

    /// A rule was not found in the registry.
    /// Only happens when asking to parse from a rule we can't find
    RuleNotFound(String),

    /// Rules kept matching inside their own matches, usually a rule wired under itself
    /// that leaves its text unchanged.
    RecursionLimit { rule: String, depth: usize },

    /// A hook returned an error. The whole parse is aborted, no partial tree is returned.
    Hook {
        rule: String,
        stage: HookStage,
        source: HookError,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
            Error::Grammar(err) => write!(f, "grammar error: {}", err),
            Error::RuleNotFound(name) => write!(f, "rule '{}' not found", name),
            Error::RecursionLimit { rule, depth } => write!(
                f,
                "rule '{}' is nested more than {} levels deep",
                rule, depth
            ),
            Error::Hook {
                rule,
                stage,
                source,
            } => write!(f, "{} of rule '{}' failed: {}", stage, rule, source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Grammar(err) => Some(err),
            Error::Hook { source, .. } => Some(source.as_ref()),
            Error::RuleNotFound(_) | Error::RecursionLimit { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<GrammarError> for Error {
    fn from(err: GrammarError) -> Self {
        Error::Grammar(err)
    }
}
