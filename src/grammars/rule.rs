use std::fmt;

use crate::tree::MatchNode;

/// Error type hooks can return. Anything implementing `std::error::Error` converts into it.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;
pub type HookResult<T> = Result<T, HookError>;

/// The semantic side of a grammar rule.
///
/// The pattern and the children live in the registry, this trait only decides what happens
/// with a match. Every method has a default so an empty `impl` gives an identity rule that
/// masks its matches behind tokens.
pub trait GrammarRule: Send + Sync {
    /// Computes the `modified_text` of a freshly created node.
    ///
    /// This is the place to stash semantic information in local or global state.
    fn on_capture(&self, node: &mut MatchNode<'_>) -> HookResult<String> {
        Ok(node.original_text().to_owned())
    }

    /// Returns the string replacing the matched span in the parent's working text, once the
    /// whole subtree of `node` has been resolved.
    fn on_substitute(&self, node: &mut MatchNode<'_>) -> HookResult<String> {
        Ok(node.token().unwrap_or_default().to_owned())
    }

    /// Called after the children of `node` are resolved and ordered.
    fn on_resolve(&self, _node: &mut MatchNode<'_>) -> HookResult<()> {
        Ok(())
    }
}

/// A rule with all the default hooks
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRule;

impl GrammarRule for DefaultRule {}

type CaptureFn = dyn Fn(&mut MatchNode<'_>) -> HookResult<String> + Send + Sync;
type SubstituteFn = dyn Fn(&mut MatchNode<'_>) -> HookResult<String> + Send + Sync;
type ResolveFn = dyn Fn(&mut MatchNode<'_>) -> HookResult<()> + Send + Sync;

/// A rule whose hooks are closures. Hooks that are not set keep their default behaviour.
///
/// ```ignore
/// let upper = FnRule::new().on_capture(|node| Ok(node.original_text().to_uppercase()));
/// ```
#[derive(Default)]
pub struct FnRule {
    capture: Option<Box<CaptureFn>>,
    substitute: Option<Box<SubstituteFn>>,
    resolve: Option<Box<ResolveFn>>,
}

impl FnRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_capture<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut MatchNode<'_>) -> HookResult<String> + Send + Sync + 'static,
    {
        self.capture = Some(Box::new(f));
        self
    }

    pub fn on_substitute<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut MatchNode<'_>) -> HookResult<String> + Send + Sync + 'static,
    {
        self.substitute = Some(Box::new(f));
        self
    }

    pub fn on_resolve<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut MatchNode<'_>) -> HookResult<()> + Send + Sync + 'static,
    {
        self.resolve = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for FnRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRule")
            .field("on_capture", &self.capture.is_some())
            .field("on_substitute", &self.substitute.is_some())
            .field("on_resolve", &self.resolve.is_some())
            .finish()
    }
}

impl GrammarRule for FnRule {
    fn on_capture(&self, node: &mut MatchNode<'_>) -> HookResult<String> {
        match &self.capture {
            Some(f) => f(node),
            None => DefaultRule.on_capture(node),
        }
    }

    fn on_substitute(&self, node: &mut MatchNode<'_>) -> HookResult<String> {
        match &self.substitute {
            Some(f) => f(node),
            None => DefaultRule.on_substitute(node),
        }
    }

    fn on_resolve(&self, node: &mut MatchNode<'_>) -> HookResult<()> {
        match &self.resolve {
            Some(f) => f(node),
            None => DefaultRule.on_resolve(node),
        }
    }
}

/// Data-driven rule used by JSON grammars.
///
/// `replacement` expands `$0`-`$9`, `${n}` and `${name}` with the capture groups (blank when
/// absent) and `$$` to a literal `$`. Without a replacement the matched text is kept.
/// An `inline` rule substitutes its resolved working text instead of its token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateRule {
    pub replacement: Option<String>,
    pub inline: bool,
}

impl TemplateRule {
    pub fn new(replacement: Option<String>, inline: bool) -> Self {
        Self {
            replacement,
            inline,
        }
    }
}

impl GrammarRule for TemplateRule {
    fn on_capture(&self, node: &mut MatchNode<'_>) -> HookResult<String> {
        let Some(template) = &self.replacement else {
            return Ok(node.original_text().to_owned());
        };
        let Some(groups) = node.capture_groups() else {
            return Ok(template.clone());
        };

        let lookup = |key: &str| -> String {
            let value = match key.parse::<usize>() {
                Ok(idx) => groups.get(idx),
                Err(_) => groups.name(key),
            };
            value.unwrap_or_default().to_owned()
        };
        expand_template(template, lookup)
    }

    fn on_substitute(&self, node: &mut MatchNode<'_>) -> HookResult<String> {
        if self.inline {
            Ok(node.working_text().to_owned())
        } else {
            DefaultRule.on_substitute(node)
        }
    }
}

fn expand_template<F>(template: &str, lookup: F) -> HookResult<String>
where
    F: Fn(&str) -> String,
{
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, d)) if d.is_ascii_digit() => {
                chars.next();
                out.push_str(&lookup(&d.to_string()));
            }
            Some((start, '{')) => {
                let rest = &template[start + 1..];
                let Some(close) = rest.find('}') else {
                    return Err(format!("unclosed `${{` in replacement '{template}'").into());
                };
                out.push_str(&lookup(&rest[..close]));
                // skip past the closing brace
                for (idx, _) in chars.by_ref() {
                    if idx == start + 1 + close {
                        break;
                    }
                }
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(key: &str) -> String {
        match key {
            "0" => "#one".to_owned(),
            "1" | "name" => "one".to_owned(),
            _ => String::new(),
        }
    }

    #[test]
    fn expands_groups() {
        assert_eq!(
            expand_template("<TAG:${name}> $1/$0 ${1}", lookup).unwrap(),
            "<TAG:one> one/#one one"
        );
    }

    #[test]
    fn missing_groups_are_blank() {
        assert_eq!(expand_template("[$7${nope}]", lookup).unwrap(), "[]");
    }

    #[test]
    fn dollar_escapes() {
        assert_eq!(expand_template("$$1 costs $", lookup).unwrap(), "$1 costs $");
    }

    #[test]
    fn unclosed_brace_is_an_error() {
        assert!(expand_template("${name", lookup).is_err());
    }
}
