//! Grammars shared by the tests.

use crate::grammars::{DefaultRule, FnRule};
use crate::registry::GrammarRegistry;
use crate::state::StateMap;

pub const TAGS_INPUT: &str = "Tags #one #Two #three and   numbers 1 23 456!!! Wow!!! #last 7?!";

const TAGS_WIRING: &str = "
Root:
  - spaces
  - exclaim
  - tag
  - number
";

/// Collapses runs of spaces and `!`, rewrites `#tags` and pads numbers, counting both in
/// the global state.
pub fn tags_registry() -> GrammarRegistry {
    GrammarRegistry::builder()
        .container("Root", DefaultRule)
        .rule(
            "spaces",
            " {2,}",
            FnRule::new().on_capture(|_| Ok(" ".to_owned())),
        )
        .rule(
            "exclaim",
            "!{2,}",
            FnRule::new().on_capture(|_| Ok("!".to_owned())),
        )
        .rule(
            "tag",
            r"#(?<name>\w+)",
            FnRule::new().on_capture(|node| {
                let name = node.group("name").unwrap_or_default().to_uppercase();
                node.global_state_mut().increment("tagCount", 1);
                Ok(format!("<TAG:{name}>"))
            }),
        )
        .rule(
            "number",
            r"\d+",
            FnRule::new().on_capture(|node| {
                let value: u64 = node.original_text().parse()?;
                let state = node.global_state_mut();
                state.increment("numCount", 1);
                let mut out = format!("[num:{value:02}]");
                if value % 2 == 0 {
                    state.increment("evenCount", 1);
                    out.push_str("<even>");
                }
                Ok(out)
            }),
        )
        .build("Root", TAGS_WIRING)
        .unwrap()
}

pub fn tags_seed() -> StateMap {
    StateMap::new()
        .with("tagCount", 0)
        .with("numCount", 0)
        .with("evenCount", 0)
}

pub const LITERALS_INPUT: &str = "name = 'John' String age = \"25\" count = `10`";

/// Uppercases assigned names, quoted literals being masked first so they are never touched.
pub fn literals_registry() -> GrammarRegistry {
    GrammarRegistry::builder()
        .container("Root", DefaultRule)
        .plain("quoted", r#"'[^']*'|"[^"]*"|`[^`]*`"#)
        .rule(
            "assign",
            r"\w+(?=\s*=)",
            FnRule::new().on_capture(|node| Ok(node.original_text().to_uppercase())),
        )
        .build("Root", "Root:\n  - quoted\n  - assign")
        .unwrap()
}
