//! The recursive matching engine.
//!
//! Child rules are cascading passes: each one scans the whole current working text of its
//! parent, after the substitutions of the children declared before it. Every match is
//! resolved depth first, its own children included, before the next match of the same pass
//! is looked at.

use std::ops::Range;
use std::sync::Arc;

use crate::captures::CaptureGroups;
use crate::error::{Error, HookStage, PhrasalResult};
use crate::grammars::{CompiledRule, HookError};
use crate::registry::GrammarRegistry;
use crate::state::StateMap;
use crate::tree::{MatchNode, NodeData, NodeId, ParseTree};

/// How deep matches can nest below the root before the parse is aborted
pub(crate) const MAX_DEPTH: usize = 128;

#[inline]
fn hook_error(rule: &CompiledRule, stage: HookStage) -> impl FnOnce(HookError) -> Error + '_ {
    move |source| Error::Hook {
        rule: rule.name().to_owned(),
        stage,
        source,
    }
}

#[derive(Debug)]
pub(crate) struct Matcher<'g> {
    registry: &'g GrammarRegistry,
}

impl<'g> Matcher<'g> {
    pub fn new(registry: &'g GrammarRegistry) -> Self {
        Self { registry }
    }

    /// Parses `input` with `rule` as the top-level rule, returning the resolved tree
    pub fn run(
        &self,
        rule: &Arc<CompiledRule>,
        input: &str,
        global_state: StateMap,
    ) -> PhrasalResult<ParseTree> {
        #[cfg(feature = "debug")]
        log::debug!("[run] Parsing {} bytes from rule '{}'", input.len(), rule.name());

        let mut tree = ParseTree::new(global_state);
        let root = tree.push(NodeData::new(
            Arc::clone(rule),
            None,
            0..input.len(),
            input.to_owned(),
        ));

        let modified = rule
            .hooks()
            .on_capture(&mut MatchNode::new(&mut tree, root))
            .map_err(hook_error(rule, HookStage::Capture))?;
        let data = tree.data_mut(root);
        data.working_text = modified.clone();
        data.modified_text = modified;

        self.resolve_children(&mut tree, root, 0)?;
        self.finish(&mut tree, root)?;

        #[cfg(feature = "debug")]
        log::debug!("[run] Done, {} nodes", tree.len());

        Ok(tree)
    }

    /// Runs every child rule of the rule that produced `parent` over its working text.
    fn resolve_children(
        &self,
        tree: &mut ParseTree,
        parent: NodeId,
        depth: usize,
    ) -> PhrasalResult<()> {
        let parent_rule = Arc::clone(&tree.data(parent).rule);

        for &child_id in parent_rule.children() {
            let child = self.registry.rule_by_id(child_id);
            let Some(regex) = child.pattern() else {
                continue;
            };

            if tree.data(parent).local_state.skips(child.name()) {
                #[cfg(feature = "debug")]
                log::debug!(
                    "[resolve_children] Skipping '{}' under '{}'",
                    child.name(),
                    parent_rule.name()
                );
                continue;
            }

            let text = tree.data(parent).working_text.clone();
            let matches = regex.matches(&text);
            #[cfg(feature = "debug")]
            log::debug!(
                "[resolve_children] '{}' found {} match(es) in |{}|",
                child.name(),
                matches.len(),
                crate::token::display(&text)
            );
            if matches.is_empty() {
                continue;
            }

            let mut rebuilt = String::with_capacity(text.len());
            let mut last_end = 0;
            for (span, groups) in matches {
                rebuilt.push_str(&text[last_end..span.start]);
                last_end = span.end;
                let replacement =
                    self.resolve_match(tree, parent, child, span, groups, depth + 1)?;
                rebuilt.push_str(&replacement);
            }
            rebuilt.push_str(&text[last_end..]);

            tree.data_mut(parent).working_text = rebuilt;
        }

        Ok(())
    }

    /// Creates the node for one match, resolves its subtree and returns what replaces the
    /// match in the parent's working text.
    fn resolve_match(
        &self,
        tree: &mut ParseTree,
        parent: NodeId,
        rule: &Arc<CompiledRule>,
        span: Range<usize>,
        groups: CaptureGroups,
        depth: usize,
    ) -> PhrasalResult<String> {
        if depth > MAX_DEPTH {
            return Err(Error::RecursionLimit {
                rule: rule.name().to_owned(),
                depth: MAX_DEPTH,
            });
        }

        let original = groups.whole().to_owned();
        let id = tree.push(NodeData::new(
            Arc::clone(rule),
            Some(parent),
            span,
            original,
        ));
        let token = tree.mint_token(rule, id);
        {
            let data = tree.data_mut(id);
            data.token = Some(token);
            data.capture_groups = Some(groups);
        }
        tree.data_mut(parent).children.push(id);

        #[cfg(feature = "debug")]
        log::trace!(
            "[resolve_match] '{}' matched |{}|",
            rule.name(),
            tree.data(id).original_text
        );

        let modified = rule
            .hooks()
            .on_capture(&mut MatchNode::new(tree, id))
            .map_err(hook_error(rule, HookStage::Capture))?;
        let data = tree.data_mut(id);
        data.working_text = modified.clone();
        data.modified_text = modified;

        self.resolve_children(tree, id, depth)?;
        self.finish(tree, id)?;

        let replacement = rule
            .hooks()
            .on_substitute(&mut MatchNode::new(tree, id))
            .map_err(hook_error(rule, HookStage::Substitute))?;

        #[cfg(feature = "debug")]
        log::trace!(
            "[resolve_match] '{}' substitutes |{}|",
            rule.name(),
            crate::token::display(&replacement)
        );

        Ok(replacement)
    }

    /// Orders the children of `id`, links them as siblings and runs `on_resolve`
    fn finish(&self, tree: &mut ParseTree, id: NodeId) -> PhrasalResult<()> {
        tree.link_children(id);
        let rule = Arc::clone(&tree.data(id).rule);
        rule.hooks()
            .on_resolve(&mut MatchNode::new(tree, id))
            .map_err(hook_error(&rule, HookStage::Resolve))
    }
}
