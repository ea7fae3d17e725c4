use std::collections::BTreeMap;
use std::ops::Range;

use serde::Serialize;

/// The text of every numbered and named group for one concrete match.
///
/// A group that did not participate in the match and a group that matched the empty string
/// look the same: both are absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CaptureGroups {
    /// Index 0 is the whole match
    groups: Vec<Option<String>>,
    #[serde(skip)]
    positions: Vec<Option<Range<usize>>>,
    /// Group name -> group indices, the first participating one wins
    #[serde(skip)]
    names: BTreeMap<String, Vec<usize>>,
}

impl CaptureGroups {
    pub(crate) fn from_onig(captures: &onig::Captures<'_>, names: &BTreeMap<String, Vec<usize>>) -> Self {
        let mut groups = Vec::with_capacity(captures.len());
        let mut positions = Vec::with_capacity(captures.len());
        for i in 0..captures.len() {
            groups.push(captures.at(i).map(str::to_owned));
            positions.push(captures.pos(i).map(|(s, e)| s..e));
        }

        Self {
            groups,
            positions,
            names: names.clone(),
        }
    }

    /// The whole matched text
    pub fn whole(&self) -> &str {
        self.get(0).unwrap_or_default()
    }

    /// Text of the numbered group `index`, `None` if it is blank or did not participate
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups
            .get(index)
            .and_then(|g| g.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Text of the named group `name`, `None` if it is blank, did not participate or does
    /// not exist in the pattern.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.names
            .get(name)?
            .iter()
            .find_map(|&idx| self.get(idx))
    }

    /// Byte range of group `index` inside the buffer that was scanned
    pub fn span(&self, index: usize) -> Option<Range<usize>> {
        self.positions.get(index).cloned().flatten()
    }

    /// Number of groups, including group 0
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Names of the named groups declared by the pattern
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }
}
