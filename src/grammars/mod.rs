mod compiled;
mod raw;
mod regex;
mod rule;
mod wiring;

pub use compiled::{CompiledRule, GrammarError, RuleId};
pub(crate) use compiled::compile_rules;
pub use raw::{RawGrammar, RawRule, RegistryBuilder, RuleDefinition};
pub use regex::Regex;
pub use rule::{DefaultRule, FnRule, GrammarRule, HookError, HookResult, TemplateRule};
pub use wiring::{WiringEdge, parse_wiring};
