//! Rules and the per-request rule set.

use std::collections::BTreeMap;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::protocol::Protocol;
use crate::parser::{parse_structured_text, ParsedValue};

static SCHEME_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9.\-]+://").expect("valid scheme prefix regex"));

/// One directive, tagged with the protocol name it belongs to.
///
/// A rule either carries a single matcher/value or a `list` of sub-rules
/// produced by merging several layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub name: String,
    pub matcher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<Rule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub is_raw_list: bool,
}

impl Rule {
    pub fn new(name: impl Into<String>, matcher: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matcher: matcher.into(),
            pattern: None,
            value: None,
            list: None,
            root: None,
            is_raw_list: false,
        }
    }

    /// Build a listed rule from several matchers of the same protocol.
    ///
    /// The head of the list doubles as the rule's own matcher. Returns `None`
    /// for an empty iterator.
    pub fn from_matchers<I, S>(name: &str, matchers: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list: Vec<Rule> = matchers.into_iter().map(|m| Rule::new(name, m)).collect();
        let mut head = list.first()?.clone();
        head.list = Some(list);
        Some(head)
    }

    /// Matcher text without its `scheme://` prefix.
    pub fn matcher_value(&self) -> &str {
        match SCHEME_PREFIX_RE.find(&self.matcher) {
            Some(prefix) => &self.matcher[prefix.end()..],
            None => &self.matcher,
        }
    }

    /// Text before the first `:` of the matcher, if there is one.
    pub fn scheme(&self) -> Option<&str> {
        self.matcher.split_once(':').map(|(scheme, _)| scheme)
    }

    /// The sub-rules of a listed rule, or the rule itself.
    pub fn entries(&self) -> &[Rule] {
        match &self.list {
            Some(list) => list,
            None => std::slice::from_ref(self),
        }
    }

    /// Structured form of the rule body: the attached value if any,
    /// otherwise the matcher value.
    pub fn parsed_value(&self) -> Option<ParsedValue> {
        let body = self.value.as_deref().unwrap_or_else(|| self.matcher_value());
        parse_structured_text(body)
    }
}

/// Key of a [`RuleSet`] entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolKey {
    Known(Protocol),
    Extension(String),
}

impl ProtocolKey {
    pub fn from_name(name: &str) -> Self {
        match Protocol::from_name(name) {
            Some(protocol) => ProtocolKey::Known(protocol),
            None => ProtocolKey::Extension(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProtocolKey::Known(protocol) => protocol.as_str(),
            ProtocolKey::Extension(name) => name,
        }
    }
}

/// The active rules of one request, at most one per protocol name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    known: BTreeMap<Protocol, Rule>,
    extensions: BTreeMap<String, Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        match ProtocolKey::from_name(name) {
            ProtocolKey::Known(protocol) => self.known.get(&protocol),
            ProtocolKey::Extension(name) => self.extensions.get(&name),
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Rule> {
        match ProtocolKey::from_name(name) {
            ProtocolKey::Known(protocol) => self.known.get_mut(&protocol),
            ProtocolKey::Extension(name) => self.extensions.get_mut(&name),
        }
    }

    pub fn get_known(&self, protocol: Protocol) -> Option<&Rule> {
        self.known.get(&protocol)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Store `rule` under its own name, returning the rule it replaced.
    pub fn insert(&mut self, rule: Rule) -> Option<Rule> {
        match ProtocolKey::from_name(&rule.name) {
            ProtocolKey::Known(protocol) => self.known.insert(protocol, rule),
            ProtocolKey::Extension(name) => self.extensions.insert(name, rule),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Rule> {
        match ProtocolKey::from_name(name) {
            ProtocolKey::Known(protocol) => self.known.remove(&protocol),
            ProtocolKey::Extension(name) => self.extensions.remove(&name),
        }
    }

    /// Names present in the set; known protocols first, in registry order.
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|(name, _)| name.to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.known
            .iter()
            .map(|(protocol, rule)| (protocol.as_str(), rule))
            .chain(self.extensions.iter().map(|(name, rule)| (name.as_str(), rule)))
    }

    pub fn len(&self) -> usize {
        self.known.len() + self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.extensions.is_empty()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut rules = RuleSet::new();
        for rule in iter {
            rules.insert(rule);
        }
        rules
    }
}

impl Serialize for RuleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, rule) in self.iter() {
            map.serialize_entry(name, rule)?;
        }
        map.end()
    }
}
