use itertools::Itertools;
use p4fpga_utils::Id;
use serde::{Deserialize, Serialize};

/// A dotted member path such as `hdr.ipv4.dstAddr`. The first segment names
/// a parameter in scope, the rest select members of its type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Path(Vec<Id>);

impl Path {
    pub fn new(segments: Vec<Id>) -> Self {
        Path(segments)
    }

    /// The parameter (or action argument) this path starts from.
    pub fn root(&self) -> Id {
        self.0.first().copied().unwrap_or_default()
    }

    /// The member selections after the root.
    pub fn members(&self) -> &[Id] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn segments(&self) -> &[Id] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first `n` segments of this path.
    pub fn prefix(&self, n: usize) -> Path {
        Path(self.0.iter().take(n).copied().collect())
    }

    /// Join the segments with `sep`, e.g. `hdr$ipv4$dstAddr`.
    pub fn join(&self, sep: &str) -> String {
        self.0.iter().join(sep)
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path(
            s.split('.')
                .filter(|seg| !seg.is_empty())
                .map(Id::from)
                .collect(),
        )
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::from(s.as_str())
    }
}

impl From<Path> for String {
    fn from(p: Path) -> Self {
        p.join(".")
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.join("."))
    }
}
