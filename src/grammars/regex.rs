use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use onig::{RegexOptions, Syntax};

use crate::captures::CaptureGroups;

/// An eagerly compiled regex that keeps its source pattern and named group table around.
///
/// Plain `(...)` groups keep their number even when the pattern also has named groups.
pub struct Regex {
    pattern: String,
    compiled: Arc<onig::Regex>,
    names: BTreeMap<String, Vec<usize>>,
}

impl Clone for Regex {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            compiled: Arc::clone(&self.compiled),
            names: self.names.clone(),
        }
    }
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", crate::token::display(&self.pattern))
    }
}

impl Regex {
    pub fn new(pattern: String) -> Result<Self, onig::Error> {
        let compiled = onig::Regex::with_options(
            &pattern,
            RegexOptions::REGEX_OPTION_CAPTURE_GROUP,
            Syntax::default(),
        )?;

        let mut names = BTreeMap::new();
        compiled.foreach_name(|name, indices| {
            names.insert(
                name.to_owned(),
                indices.iter().map(|&i| i as usize).collect(),
            );
            true
        });

        Ok(Self {
            pattern,
            compiled: Arc::new(compiled),
            names,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Every non-overlapping match in `text`, left to right.
    pub fn captures_all(&self, text: &str) -> Vec<CaptureGroups> {
        self.compiled
            .captures_iter(text)
            .map(|caps| CaptureGroups::from_onig(&caps, &self.names))
            .collect()
    }

    /// Spans and captures of every non-overlapping match in `text`, left to right.
    pub(crate) fn matches(&self, text: &str) -> Vec<(Range<usize>, CaptureGroups)> {
        self.captures_all(text)
            .into_iter()
            .filter_map(|caps| caps.span(0).map(|span| (span, caps)))
            .collect()
    }
}
