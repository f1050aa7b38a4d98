//! Intent values and the reserved system intents

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace of the reserved intents
pub const RESERVED_NAMESPACE: &str = "sys";

const UNKNOWN: &str = "unknown";
const KEYWORD: &str = "keyword";
const RAG_EXCLUDED: &str = "rag-excluded";

/// A named user or system intent. Two intents are equal when their names are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intent {
    name: String,
}

impl Intent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Intent used when nothing else matches
    pub fn unknown() -> Self {
        Self::reserved(UNKNOWN)
    }

    /// Intent used to bypass NLP with a keyword
    pub fn keyword() -> Self {
        Self::reserved(KEYWORD)
    }

    /// Intent for questions the RAG fallback must not answer
    pub fn rag_excluded() -> Self {
        Self::reserved(RAG_EXCLUDED)
    }

    fn reserved(name: &str) -> Self {
        Self::new(format!("{RESERVED_NAMESPACE}:{name}"))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name with any `namespace:` prefix removed
    pub fn name_without_namespace(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }

    pub fn is_keyword(&self) -> bool {
        *self == Self::keyword()
    }

    pub fn is_rag_excluded(&self) -> bool {
        *self == Self::rag_excluded()
    }

    /// Is this one of the reserved system intents?
    pub fn is_reserved(&self) -> bool {
        self.is_unknown() || self.is_keyword() || self.is_rag_excluded()
    }
}

/// Which reserved fallback a raw intent name designates, if any.
///
/// Both the bare (`keyword`) and the namespaced (`sys:keyword`) forms match.
/// The order of the checks is `keyword`, then `rag-excluded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReservedName {
    Keyword,
    RagExcluded,
    Other,
}

impl ReservedName {
    pub(crate) fn classify(name: &str) -> Self {
        if matches_reserved(name, KEYWORD) {
            Self::Keyword
        } else if matches_reserved(name, RAG_EXCLUDED) {
            Self::RagExcluded
        } else {
            Self::Other
        }
    }
}

fn matches_reserved(name: &str, local: &str) -> bool {
    name == local
        || name
            .strip_prefix(RESERVED_NAMESPACE)
            .and_then(|rest| rest.strip_prefix(':'))
            .is_some_and(|rest| rest == local)
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Intent {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Intent {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}
