//! Action-name sets derived from `enable`/`disable`/`filter`/`ignore`/`delete` rules.

use std::collections::BTreeSet;

use serde::Serialize;

use super::rule::Rule;

/// Characters separating action names inside one directive.
pub const ACTION_SEPARATORS: [char; 2] = ['|', '&'];

/// A set of action names such as `intercept` or `ignore|proxy`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DirectiveSet(BTreeSet<String>);

impl DirectiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// New set holding the names of both sets.
    pub fn union(&self, other: &DirectiveSet) -> DirectiveSet {
        DirectiveSet(self.0.union(&other.0).cloned().collect())
    }
}

impl<S: Into<String>> FromIterator<S> for DirectiveSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        DirectiveSet(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for DirectiveSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

/// The five request-scoped directive sets read by downstream mutators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectiveMaps {
    pub delete: DirectiveSet,
    pub filter: DirectiveSet,
    pub disable: DirectiveSet,
    pub ignore: DirectiveSet,
    pub enable: DirectiveSet,
}

/// Split a directive body into action names.
pub fn split_actions(text: &str) -> impl Iterator<Item = &str> {
    text.split(ACTION_SEPARATORS)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Add the action names carried by `rule` (every entry of a listed rule) to
/// `props`.
pub fn resolve_rule_props(rule: Option<&Rule>, mut props: DirectiveSet) -> DirectiveSet {
    if let Some(rule) = rule {
        for entry in rule.entries() {
            props.extend(split_actions(entry.matcher_value()));
        }
    }
    props
}

/// Action names of an inline `lineProps://a|b` directive.
///
/// Returns `None` when the text names no action.
pub fn parse_line_props(text: &str) -> Option<DirectiveSet> {
    let body = text.split_once("://").map_or(text, |(_, rest)| rest);
    let props: DirectiveSet = split_actions(body).collect();
    if props.is_empty() {
        None
    } else {
        Some(props)
    }
}
