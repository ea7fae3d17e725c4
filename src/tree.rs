//! The match tree produced by one parse invocation.
//!
//! Nodes live in an arena owned by [`ParseTree`] and refer to each other by [`NodeId`]:
//! parents, children, siblings and the token registry are all indices into that arena.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::captures::CaptureGroups;
use crate::grammars::{CompiledRule, RuleId};
use crate::state::{SKIP_ALL, SKIP_PREFIX, StateMap};
use crate::token;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    pub fn as_index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) rule: Arc<CompiledRule>,
    pub(crate) parent: Option<NodeId>,
    /// Offsets into the parent's working text at the time of the match
    pub(crate) span: Range<usize>,
    pub(crate) original_text: String,
    pub(crate) modified_text: String,
    pub(crate) working_text: String,
    pub(crate) token: Option<String>,
    pub(crate) capture_groups: Option<CaptureGroups>,
    pub(crate) local_state: StateMap,
    pub(crate) children: Vec<NodeId>,
    pub(crate) previous_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
}

impl NodeData {
    pub(crate) fn new(
        rule: Arc<CompiledRule>,
        parent: Option<NodeId>,
        span: Range<usize>,
        original_text: String,
    ) -> Self {
        Self {
            rule,
            parent,
            span,
            modified_text: original_text.clone(),
            working_text: original_text.clone(),
            original_text,
            token: None,
            capture_groups: None,
            local_state: StateMap::default(),
            children: Vec::new(),
            previous_sibling: None,
            next_sibling: None,
        }
    }
}

/// Every node created during one invocation, the global state and the token registry.
#[derive(Debug, Clone)]
pub struct ParseTree {
    nodes: Vec<NodeData>,
    global_state: StateMap,
    /// token -> node that minted it
    tokens: HashMap<String, NodeId>,
    occurrences: HashMap<RuleId, usize>,
    sequence: usize,
}

impl ParseTree {
    pub(crate) fn new(global_state: StateMap) -> Self {
        Self {
            nodes: Vec::new(),
            global_state,
            tokens: HashMap::new(),
            occurrences: HashMap::new(),
            sequence: 0,
        }
    }

    pub(crate) fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    #[inline]
    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.as_index()]
    }

    #[inline]
    pub(crate) fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.as_index()]
    }

    /// Mints the token of the next occurrence of `rule` and registers it for `owner`
    pub(crate) fn mint_token(&mut self, rule: &CompiledRule, owner: NodeId) -> String {
        let occurrence = self.occurrences.entry(rule.id()).or_insert(0);
        *occurrence += 1;
        self.sequence += 1;
        let token = token::mint(rule.name(), *occurrence, self.sequence);
        self.tokens.insert(token.clone(), owner);
        token
    }

    /// Sorts the children of `id` by span start and links them as siblings
    pub(crate) fn link_children(&mut self, id: NodeId) {
        let mut children = std::mem::take(&mut self.data_mut(id).children);
        // stable: children starting at the same offset keep their creation order
        children.sort_by_key(|c| self.data(*c).span.start);

        for (i, child) in children.iter().enumerate() {
            let previous = i.checked_sub(1).map(|p| children[p]);
            let next = children.get(i + 1).copied();
            let data = self.data_mut(*child);
            data.previous_sibling = previous;
            data.next_sibling = next;
        }
        self.data_mut(id).children = children;
    }

    /// The synthetic root of the invocation
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: NodeId::ROOT,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.as_index() < self.nodes.len()).then_some(NodeRef { tree: self, id })
    }

    /// All the nodes in creation order, root first
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> {
        (0..self.nodes.len()).map(|i| NodeRef {
            tree: self,
            id: NodeId(i),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn global_state(&self) -> &StateMap {
        &self.global_state
    }

    /// The node that minted `token`
    pub fn node_for_token(&self, token: &str) -> Option<NodeRef<'_>> {
        self.tokens
            .get(token)
            .map(|&id| NodeRef { tree: self, id })
    }

    /// Replaces every known token in `text` by its owner's `modified_text`, again and again
    /// until nothing changes.
    pub fn unmask(&self, text: &str) -> String {
        self.expand(text, |data| data.modified_text.as_str())
    }

    /// Like [`ParseTree::unmask`] but with each owner's fully resolved working text: the
    /// input as rewritten by every rule.
    pub fn render(&self) -> String {
        match self.nodes.first() {
            Some(root) => self.expand(&root.working_text, |data| data.working_text.as_str()),
            None => String::new(),
        }
    }

    fn expand(&self, text: &str, field: fn(&NodeData) -> &str) -> String {
        let mut current = text.to_owned();
        // each pass peels at least one level of nesting, a hook quoting a node's own token
        // back into its text would otherwise never settle
        for _ in 0..=self.nodes.len() {
            let next = token::replace_tokens(&current, |t| {
                self.tokens.get(t).map(|id| field(self.data(*id)))
            });
            if next == current {
                break;
            }
            current = next;
        }
        current
    }
}

impl Serialize for ParseTree {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("ParseTree", 2)?;
        s.serialize_field("root", &self.root())?;
        s.serialize_field("global_state", &self.global_state)?;
        s.end()
    }
}

/// A read-only view of one node of a [`ParseTree`].
#[derive(Copy, Clone)]
pub struct NodeRef<'t> {
    tree: &'t ParseTree,
    id: NodeId,
}

impl<'t> NodeRef<'t> {
    fn data(&self) -> &'t NodeData {
        self.tree.data(self.id)
    }

    fn at(&self, id: NodeId) -> NodeRef<'t> {
        NodeRef {
            tree: self.tree,
            id,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'t ParseTree {
        self.tree
    }

    pub fn rule(&self) -> &'t CompiledRule {
        &self.data().rule
    }

    pub fn rule_name(&self) -> &'t str {
        self.data().rule.name()
    }

    pub fn is_root(&self) -> bool {
        self.data().parent.is_none()
    }

    pub fn span(&self) -> Range<usize> {
        self.data().span.clone()
    }

    /// The text as matched
    pub fn original_text(&self) -> &'t str {
        &self.data().original_text
    }

    /// The text returned by `on_capture`
    pub fn modified_text(&self) -> &'t str {
        &self.data().modified_text
    }

    /// The modified text after every child rule substituted its matches
    pub fn working_text(&self) -> &'t str {
        &self.data().working_text
    }

    /// `None` only for the root
    pub fn token(&self) -> Option<&'t str> {
        self.data().token.as_deref()
    }

    /// `None` only for the root
    pub fn capture_groups(&self) -> Option<&'t CaptureGroups> {
        self.data().capture_groups.as_ref()
    }

    /// Shortcut for a named group of this node's match
    pub fn group(&self, name: &str) -> Option<&'t str> {
        self.capture_groups().and_then(|c| c.name(name))
    }

    pub fn local_state(&self) -> &'t StateMap {
        &self.data().local_state
    }

    pub fn global_state(&self) -> &'t StateMap {
        &self.tree.global_state
    }

    pub fn parent(&self) -> Option<NodeRef<'t>> {
        self.data().parent.map(|id| self.at(id))
    }

    /// Direct children ordered by span start
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'t>> + use<'t> {
        let this = *self;
        self.data().children.iter().map(move |&id| this.at(id))
    }

    /// Direct children produced by the rule `name`
    pub fn children_of(&self, name: &str) -> impl Iterator<Item = NodeRef<'t>> + use<'t> {
        let name = name.to_owned();
        self.children().filter(move |c| c.rule_name() == name)
    }

    /// Every node below this one produced by the rule `name`, depth first
    pub fn descendants_of(&self, name: &str) -> Vec<NodeRef<'t>> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeRef<'t>> = self.children().collect();
        stack.reverse();
        while let Some(node) = stack.pop() {
            if node.rule_name() == name {
                out.push(node);
            }
            let len = stack.len();
            stack.extend(node.children());
            stack[len..].reverse();
        }
        out
    }

    pub fn previous_sibling(&self) -> Option<NodeRef<'t>> {
        self.data().previous_sibling.map(|id| self.at(id))
    }

    pub fn next_sibling(&self) -> Option<NodeRef<'t>> {
        self.data().next_sibling.map(|id| self.at(id))
    }

    /// Closest previous sibling produced by the rule `name`
    pub fn previous_sibling_named(&self, name: &str) -> Option<NodeRef<'t>> {
        let mut current = self.previous_sibling();
        while let Some(node) = current {
            if node.rule_name() == name {
                return Some(node);
            }
            current = node.previous_sibling();
        }
        None
    }

    /// Closest next sibling produced by the rule `name`
    pub fn next_sibling_named(&self, name: &str) -> Option<NodeRef<'t>> {
        let mut current = self.next_sibling();
        while let Some(node) = current {
            if node.rule_name() == name {
                return Some(node);
            }
            current = node.next_sibling();
        }
        None
    }

    /// The working text with every token unmasked, see [`ParseTree::unmask`]
    pub fn unmasked_text(&self) -> String {
        self.tree.unmask(self.working_text())
    }

    /// The working text with every token replaced by its owner's resolved working text
    pub fn rendered_text(&self) -> String {
        self.tree
            .expand(self.working_text(), |data| data.working_text.as_str())
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("rule", &self.rule_name())
            .field("span", &self.span())
            .field("working_text", &token::display(self.working_text()))
            .finish()
    }
}

impl Serialize for NodeRef<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let children: Vec<NodeRef<'_>> = self.children().collect();
        let mut s = serializer.serialize_struct("MatchNode", 9)?;
        s.serialize_field("rule", self.rule_name())?;
        s.serialize_field("span", &[self.span().start, self.span().end])?;
        s.serialize_field("token", &self.token().map(token::display))?;
        s.serialize_field("original_text", &token::display(self.original_text()))?;
        s.serialize_field("modified_text", &token::display(self.modified_text()))?;
        s.serialize_field("working_text", &token::display(self.working_text()))?;
        s.serialize_field("captures", &self.capture_groups())?;
        s.serialize_field("local_state", self.local_state())?;
        s.serialize_field("children", &children)?;
        s.end()
    }
}

/// The node handed to rule hooks: the read accessors of [`NodeRef`] plus write access to the
/// node's local state and to the invocation's global state.
pub struct MatchNode<'t> {
    tree: &'t mut ParseTree,
    id: NodeId,
}

impl<'t> MatchNode<'t> {
    pub(crate) fn new(tree: &'t mut ParseTree, id: NodeId) -> Self {
        Self { tree, id }
    }

    /// A read-only view for anything not exposed directly, like navigation
    pub fn view(&self) -> NodeRef<'_> {
        NodeRef {
            tree: &*self.tree,
            id: self.id,
        }
    }

    fn data(&self) -> &NodeData {
        self.tree.data(self.id)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn rule_name(&self) -> &str {
        self.data().rule.name()
    }

    pub fn span(&self) -> Range<usize> {
        self.data().span.clone()
    }

    pub fn original_text(&self) -> &str {
        &self.data().original_text
    }

    pub fn modified_text(&self) -> &str {
        &self.data().modified_text
    }

    pub fn working_text(&self) -> &str {
        &self.data().working_text
    }

    pub fn token(&self) -> Option<&str> {
        self.data().token.as_deref()
    }

    pub fn capture_groups(&self) -> Option<&CaptureGroups> {
        self.data().capture_groups.as_ref()
    }

    pub fn group(&self, name: &str) -> Option<&str> {
        self.capture_groups().and_then(|c| c.name(name))
    }

    pub fn parent(&self) -> Option<NodeRef<'_>> {
        self.view().parent()
    }

    pub fn local_state(&self) -> &StateMap {
        &self.data().local_state
    }

    pub fn local_state_mut(&mut self) -> &mut StateMap {
        &mut self.tree.data_mut(self.id).local_state
    }

    pub fn global_state(&self) -> &StateMap {
        &self.tree.global_state
    }

    pub fn global_state_mut(&mut self) -> &mut StateMap {
        &mut self.tree.global_state
    }

    /// Stops the child rule `name` from matching anything under this node
    pub fn skip_rule(&mut self, name: &str) {
        self.local_state_mut().put(format!("{SKIP_PREFIX}{name}"), true);
    }

    /// Stops every child rule from matching under this node
    pub fn skip_all_children(&mut self) {
        self.local_state_mut().put(SKIP_ALL, true);
    }

    /// See [`ParseTree::unmask`]
    pub fn unmask(&self, text: &str) -> String {
        self.tree.unmask(text)
    }
}

impl fmt::Debug for MatchNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.view().fmt(f)
    }
}
