mod captures;
mod error;
mod grammars;
mod matcher;
mod registry;
mod state;
pub mod token;
mod tree;

#[cfg(test)]
mod test_utils;

pub use captures::CaptureGroups;
pub use error::{Error, HookStage};
pub use grammars::{
    CompiledRule, DefaultRule, FnRule, GrammarError, GrammarRule, HookError, HookResult,
    RawGrammar, RawRule, Regex, RegistryBuilder, RuleDefinition, RuleId, TemplateRule,
    WiringEdge, parse_wiring,
};
pub use registry::GrammarRegistry;
pub use state::StateMap;
pub use tree::{MatchNode, NodeId, NodeRef, ParseTree};
