use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, PhrasalResult};
use crate::grammars::{
    CompiledRule, GrammarError, RegistryBuilder, RuleDefinition, RuleId, compile_rules,
    parse_wiring,
};
use crate::matcher::Matcher;
use crate::state::StateMap;
use crate::tree::ParseTree;

/// A fully built grammar: every rule with its resolved pattern and wired children.
///
/// Read-only once built, so a single registry can serve concurrent parses. Each invocation
/// owns its own [`ParseTree`], global state and token registry.
#[derive(Debug)]
pub struct GrammarRegistry {
    rules: Vec<Arc<CompiledRule>>,
    rule_id_by_name: HashMap<String, RuleId>,
    root: RuleId,
}

impl GrammarRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Runs every build phase: discovery, templates, regexes and finally the wiring.
    pub(crate) fn compile(
        definitions: Vec<RuleDefinition>,
        root: &str,
        wiring: &str,
    ) -> Result<Self, GrammarError> {
        let (mut rules, rule_id_by_name) = compile_rules(definitions)?;

        for edge in parse_wiring(wiring)? {
            let lookup = |name: &str| {
                rule_id_by_name
                    .get(name)
                    .copied()
                    .ok_or_else(|| GrammarError::UnknownRule {
                        name: name.to_owned(),
                        line: edge.line,
                    })
            };
            let parent = lookup(&edge.parent)?;
            let child = lookup(&edge.child)?;
            rules[parent.as_index()].children.push(child);
        }

        let Some(&root) = rule_id_by_name.get(root) else {
            return Err(GrammarError::UnknownRoot {
                name: root.to_owned(),
            });
        };

        #[cfg(feature = "debug")]
        log::debug!(
            "[compile] Built {} rules, root is '{}'",
            rules.len(),
            rules[root.as_index()].name()
        );

        Ok(Self {
            rules: rules.into_iter().map(Arc::new).collect(),
            rule_id_by_name,
            root,
        })
    }

    /// Parses `input` from the root rule with an empty global state
    pub fn parse(&self, input: &str) -> PhrasalResult<ParseTree> {
        self.parse_with_state(input, StateMap::new())
    }

    /// Parses `input` from the root rule, the global state starting as `global_state`
    pub fn parse_with_state(&self, input: &str, global_state: StateMap) -> PhrasalResult<ParseTree> {
        Matcher::new(self).run(self.rule_by_id(self.root), input, global_state)
    }

    /// Parses `input` as if `rule_name` were the root, ignoring the grammar's root.
    pub fn parse_from(
        &self,
        rule_name: &str,
        input: &str,
        global_state: StateMap,
    ) -> PhrasalResult<ParseTree> {
        let rule = self
            .rule(rule_name)
            .ok_or_else(|| Error::RuleNotFound(rule_name.to_owned()))?;
        Matcher::new(self).run(rule, input, global_state)
    }

    pub fn root(&self) -> &CompiledRule {
        self.rule_by_id(self.root)
    }

    pub fn rule(&self, name: &str) -> Option<&Arc<CompiledRule>> {
        self.rule_id_by_name
            .get(name)
            .map(|id| self.rule_by_id(*id))
    }

    pub fn contains_rule(&self, name: &str) -> bool {
        self.rule_id_by_name.contains_key(name)
    }

    /// All rules in registration order
    pub fn rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    #[inline]
    pub(crate) fn rule_by_id(&self, id: RuleId) -> &Arc<CompiledRule> {
        &self.rules[id.as_index()]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::HookStage;
    use crate::grammars::{DefaultRule, FnRule, RawGrammar};
    use crate::matcher::MAX_DEPTH;
    use crate::test_utils::{
        LITERALS_INPUT, TAGS_INPUT, literals_registry, tags_registry, tags_seed,
    };
    use crate::tree::NodeRef;

    fn outline(node: NodeRef<'_>, depth: usize, out: &mut String) {
        out.push_str(&format!(
            "{}{} {:?} -> {:?}\n",
            "  ".repeat(depth),
            node.rule_name(),
            node.original_text(),
            crate::token::display(node.working_text()),
        ));
        for child in node.children() {
            outline(child, depth + 1, out);
        }
    }

    #[test]
    fn rewrites_tags_and_numbers() {
        let registry = tags_registry();
        let tree = registry.parse_with_state(TAGS_INPUT, tags_seed()).unwrap();

        assert_eq!(
            tree.render(),
            "Tags <TAG:ONE> <TAG:TWO> <TAG:THREE> and numbers [num:01] [num:23] [num:456]<even>! Wow! <TAG:LAST> [num:07]?!"
        );
        let state = tree.global_state();
        assert_eq!(state.get_i64("tagCount"), Some(4));
        assert_eq!(state.get_i64("numCount"), Some(4));
        assert_eq!(state.get_i64("evenCount"), Some(1));
    }

    #[test]
    fn children_are_ordered_by_position() {
        let registry = tags_registry();
        let tree = registry.parse_with_state(TAGS_INPUT, tags_seed()).unwrap();
        let root = tree.root();

        let tags: Vec<_> = root
            .children_of("tag")
            .map(|n| n.group("name").unwrap_or_default())
            .collect();
        assert_eq!(tags, vec!["one", "Two", "three", "last"]);

        let starts: Vec<_> = root.children().map(|n| n.span().start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);

        for child in root.children() {
            if let Some(next) = child.next_sibling() {
                assert_eq!(next.previous_sibling().map(|n| n.id()), Some(child.id()));
            }
        }
    }

    #[test]
    fn can_navigate_siblings() {
        let registry = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .plain("number", r"\d+")
            .plain("word", "[a-z]+")
            .build("Root", "Root:\n  - number\n  - word")
            .unwrap();
        let tree = registry.parse("a 1 b 2 c").unwrap();
        let texts: Vec<_> = tree.root().children().map(|n| n.original_text()).collect();
        // the word pass runs on a buffer where numbers are already masked
        assert_eq!(texts, vec!["a", "1", "2", "b", "c"]);

        let b = tree.root().children().nth(3).unwrap();
        assert_eq!(b.previous_sibling().map(|n| n.original_text()), Some("2"));
        assert_eq!(
            b.previous_sibling_named("word").map(|n| n.original_text()),
            Some("a")
        );
        let one = tree.root().children().nth(1).unwrap();
        assert_eq!(
            one.next_sibling_named("word").map(|n| n.original_text()),
            Some("b")
        );
        assert!(b.next_sibling_named("number").is_none());
        assert_eq!(b.parent().map(|n| n.is_root()), Some(true));
    }

    #[test]
    fn preserves_quoted_literals() {
        let registry = literals_registry();
        let tree = registry.parse(LITERALS_INPUT).unwrap();
        assert_eq!(
            tree.render(),
            "NAME = 'John' String AGE = \"25\" COUNT = `10`"
        );
        assert_eq!(tree.root().children_of("quoted").count(), 3);
    }

    #[test]
    fn identity_grammar_round_trips() {
        let registry = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .plain("word", r"\w+")
            .plain("punct", r"[,.!?]")
            .build("Root", "Root:\n  - word\n  - punct")
            .unwrap();
        let input = "Hello, world! How are you?";
        let tree = registry.parse(input).unwrap();

        assert_eq!(tree.render(), input);
        assert_eq!(tree.unmask(tree.root().working_text()), input);
        assert_eq!(tree.root().children().count(), 8);
        // every word is masked in the root's working text
        assert!(!tree.root().working_text().contains("Hello"));
    }

    #[test]
    fn parses_are_deterministic() {
        let registry = tags_registry();
        let first = registry.parse_with_state(TAGS_INPUT, tags_seed()).unwrap();
        let second = registry.parse_with_state(TAGS_INPUT, tags_seed()).unwrap();

        assert_eq!(first.render(), second.render());
        assert_eq!(first.root().working_text(), second.root().working_text());
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn local_state_stays_on_its_node() {
        let registry = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .rule(
                "word",
                r"\w+",
                FnRule::new().on_capture(|node| {
                    let text = node.original_text().to_owned();
                    node.local_state_mut().put("length", text.len());
                    node.global_state_mut().increment("words", 1);
                    Ok(text)
                }),
            )
            .build("Root", "Root:\n  - word")
            .unwrap();
        let tree = registry.parse("a bb ccc").unwrap();

        let lengths: Vec<_> = tree
            .root()
            .children()
            .map(|n| n.local_state().get_i64("length"))
            .collect();
        assert_eq!(lengths, vec![Some(1), Some(2), Some(3)]);
        assert!(tree.root().local_state().is_empty());
        assert_eq!(tree.global_state().get_i64("words"), Some(3));
    }

    #[test]
    fn global_state_does_not_leak_between_parses() {
        let registry = tags_registry();
        let first = registry.parse_with_state(TAGS_INPUT, tags_seed()).unwrap();
        let second = registry.parse_with_state("#solo", tags_seed()).unwrap();

        assert_eq!(first.global_state().get_i64("tagCount"), Some(4));
        assert_eq!(second.global_state().get_i64("tagCount"), Some(1));
    }

    #[test]
    fn skip_flags_suppress_children() {
        let registry = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .rule(
                "call",
                r"\w+\([^)]*\)",
                FnRule::new().on_capture(|node| {
                    if node.original_text().starts_with("raw") {
                        node.skip_rule("arg");
                    }
                    if node.original_text().starts_with("none") {
                        node.skip_all_children();
                    }
                    Ok(node.original_text().to_owned())
                }),
            )
            .rule(
                "arg",
                r"\d+",
                FnRule::new().on_capture(|node| Ok(format!("<{}>", node.original_text()))),
            )
            .rule(
                "name",
                r"^\w+",
                FnRule::new().on_capture(|node| Ok(node.original_text().to_uppercase())),
            )
            .build("Root", "Root:\n  - call:\n    - arg\n    - name")
            .unwrap();
        let tree = registry.parse("f(1) raw(2) none(3)").unwrap();

        assert_eq!(tree.render(), "F(<1>) RAW(2) none(3)");
        let calls: Vec<_> = tree.root().children_of("call").collect();
        assert_eq!(calls[0].children().count(), 2);
        assert_eq!(calls[1].children().count(), 1);
        assert_eq!(calls[2].children().count(), 0);
    }

    #[test]
    fn hook_errors_abort_the_parse() {
        let registry = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .rule(
                "number",
                r"\d+",
                FnRule::new().on_capture(|node| {
                    let value: u8 = node.original_text().parse()?;
                    Ok(value.to_string())
                }),
            )
            .build("Root", "Root:\n  - number")
            .unwrap();

        assert!(registry.parse("1 2 3").is_ok());
        let err = registry.parse("1 2 300").unwrap_err();
        match err {
            Error::Hook { rule, stage, .. } => {
                assert_eq!(rule, "number");
                assert_eq!(stage, HookStage::Capture);
            }
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn templates_match_resolved_tokens() {
        let registry = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .plain("number", r"\d+")
            .rule(
                "sum",
                r"<<number>>(?:\s*\+\s*<<number>>)+",
                FnRule::new().on_resolve(|node| {
                    let total: i64 = node
                        .unmask(node.original_text())
                        .split('+')
                        .filter_map(|n| n.trim().parse::<i64>().ok())
                        .sum();
                    node.local_state_mut().put("total", total);
                    Ok(())
                }),
            )
            .build("Root", "Root:\n  - number\n  - sum\nsum:\n  - number")
            .unwrap();
        let tree = registry.parse("1 + 2 + 39 and 7").unwrap();

        let sums: Vec<_> = tree.root().children_of("sum").collect();
        assert_eq!(sums.len(), 1);
        assert_eq!(sums[0].local_state().get_i64("total"), Some(42));
        // numbers are already masked in the sum's text
        assert_eq!(sums[0].children_of("number").count(), 0);
        assert_eq!(tree.render(), "1 + 2 + 39 and 7");
    }

    #[test]
    fn templates_match_literals_without_an_earlier_pass() {
        let registry = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .plain("word", "[a-z]+")
            .rule(
                "pair",
                "<<word>>=<<word>>",
                FnRule::new().on_capture(|node| Ok(node.original_text().replace('=', " => "))),
            )
            .build("Root", "Root:\n  - pair")
            .unwrap();
        let tree = registry.parse("a=b, c=d").unwrap();

        assert_eq!(tree.root().children_of("pair").count(), 2);
        assert_eq!(tree.render(), "a => b, c => d");
    }

    #[test]
    fn self_nested_rules_hit_the_depth_limit() {
        let registry = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .plain("word", "[a-z]+")
            .build("Root", "Root:\n  - word\nword:\n  - word")
            .unwrap();

        let err = registry.parse("abc").unwrap_err();
        assert!(matches!(
            err,
            Error::RecursionLimit { ref rule, depth } if rule == "word" && depth == MAX_DEPTH
        ));
    }

    #[test]
    fn nested_rules_resolve_depth_first() {
        let registry = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .rule(
                "group",
                r"\[[^\]]*\]",
                FnRule::new().on_substitute(|node| Ok(format!("({})", node.working_text()))),
            )
            .rule(
                "word",
                r"[a-z]+",
                FnRule::new().on_capture(|node| Ok(node.original_text().to_uppercase())),
            )
            .build("Root", "Root:\n  - group:\n    - word\n  - word")
            .unwrap();
        let tree = registry.parse("x [a b] y").unwrap();

        assert_eq!(tree.render(), "X ([A B]) Y");
        let group = tree.root().children_of("group").next().unwrap();
        assert_eq!(group.original_text(), "[a b]");
        assert_eq!(tree.unmask(group.working_text()), "[A B]");
        assert_eq!(group.rendered_text(), "[A B]");
        assert_eq!(group.descendants_of("word").len(), 2);
        assert_eq!(tree.root().descendants_of("word").len(), 4);
    }

    #[test]
    fn parse_from_uses_the_given_rule() {
        let registry = tags_registry();
        let tree = registry
            .parse_from("tag", "#deep #er", StateMap::new())
            .unwrap();
        assert_eq!(tree.root().rule_name(), "tag");

        let err = registry
            .parse_from("missing", "x", StateMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::RuleNotFound(name) if name == "missing"));
    }

    #[test]
    fn wiring_errors_are_reported() {
        let err = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .build("Root", "Root:\n  - ghost")
            .unwrap_err();
        assert!(matches!(err, GrammarError::UnknownRule { ref name, line: 2 } if name == "ghost"));

        let err = GrammarRegistry::builder()
            .container("Root", DefaultRule)
            .build("Main", "")
            .unwrap_err();
        assert!(matches!(err, GrammarError::UnknownRoot { .. }));
    }

    #[test]
    fn can_load_raw_grammar() {
        let raw = RawGrammar::from_json_str(
            &json!({
                "name": "greetings",
                "root": "Root",
                "rules": [
                    { "name": "Root" },
                    { "name": "hello", "match": "(?i)hello", "replace": "hi" },
                    { "name": "name", "match": "(?<first>[A-Z][a-z]+)", "replace": "${first}!", "inline": true }
                ],
                "wiring": "Root:\n  - hello\n  - name"
            })
            .to_string(),
        )
        .unwrap();
        let registry = raw.compile().unwrap();
        let tree = registry.parse("Hello Alice").unwrap();

        assert_eq!(tree.render(), "hi Alice!");
        // inline rules leave no token behind
        assert!(tree.root().working_text().ends_with("Alice!"));
    }

    #[test]
    fn can_be_shared_between_threads() {
        let registry = tags_registry();
        let expected = registry
            .parse_with_state(TAGS_INPUT, tags_seed())
            .unwrap()
            .render();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        registry
                            .parse_with_state(TAGS_INPUT, tags_seed())
                            .unwrap()
                            .render()
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }

    #[test]
    fn tree_outline() {
        let registry = tags_registry();
        let tree = registry
            .parse_with_state("#hi  42!!", tags_seed())
            .unwrap();
        let mut out = String::new();
        outline(tree.root(), 0, &mut out);

        insta::assert_snapshot!(out, @r##"
        Root "#hi  42!!" -> "{tag#1}{spaces#1}{number#1}{exclaim#1}"
          tag "#hi" -> "<TAG:HI>"
          spaces "  " -> " "
          exclaim "!!" -> "!"
          number "42" -> "[num:42]<even>"
        "##);
    }
}
