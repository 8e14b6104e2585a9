//! Merging of rule layers into a request's rule set.

use std::collections::HashSet;

use tracing::debug;

use super::directive::{resolve_rule_props, DirectiveMaps, DirectiveSet};
use super::ignore::ignore_rules;
use super::protocol::{is_response_protocol, Protocol};
use super::rule::{Rule, RuleSet};
use super::Phase;

/// `enable` actions that also act as filters.
pub const FILTER_PROMOTIONS: [&str; 4] = ["https", "intercept", "capture", "hide"];

/// Rules and derived directive sets of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub rules: RuleSet,
    pub directives: DirectiveMaps,
}

impl RequestContext {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            directives: DirectiveMaps::default(),
        }
    }
}

/// Combine two layers of the same protocol.
///
/// Listed rules are concatenated, current entries first; otherwise the
/// incoming layer wins.
pub fn merge_rule(current: Option<Rule>, incoming: Option<Rule>) -> Option<Rule> {
    match (current, incoming) {
        (Some(mut current), Some(incoming)) if incoming.list.is_some() => {
            let mut list = current.list.take().unwrap_or_else(|| vec![current.clone()]);
            list.extend(incoming.list.unwrap_or_default());
            current.list = Some(list);
            filter_repeat_plugin(&mut current);
            Some(current)
        }
        (current, None) => current,
        (_, incoming) => incoming,
    }
}

/// Keep only the first entry per plugin in a merged `plugin` rule.
pub fn filter_repeat_plugin(rule: &mut Rule) {
    if rule.name != Protocol::Plugin.as_str() {
        return;
    }
    let Some(list) = rule.list.as_mut() else {
        return;
    };

    let mut seen = HashSet::new();
    let before = list.len();
    list.retain(|entry| seen.insert(plugin_key(&entry.matcher).to_string()));
    if list.len() < before {
        debug!(dropped = before - list.len(), "Repeated plugin rules dropped");
    }
}

/// `.foo` for `plugin.foo://...`; matchers lacking either delimiter are their
/// own key.
fn plugin_key(matcher: &str) -> &str {
    match (matcher.find('.'), matcher.find(':')) {
        (Some(dot), Some(colon)) if dot < colon => &matcher[dot..colon],
        _ => matcher,
    }
}

/// Merge `additions` into the request, refresh its directive sets and prune
/// what they switch off.
///
/// During the response phase only response protocols are merged or pruned.
/// Returns the rules that were merged in, so additions skipped for the phase
/// are not part of the result.
pub fn merge_rules(ctx: &mut RequestContext, additions: Option<&RuleSet>, phase: Phase) -> RuleSet {
    let mut applied = RuleSet::new();
    if let Some(additions) = additions {
        for (name, incoming) in additions.iter() {
            if phase == Phase::Response && !is_response_protocol(name) {
                continue;
            }
            let current = ctx.rules.remove(name);
            if let Some(merged) = merge_rule(current, Some(incoming.clone())) {
                ctx.rules.insert(merged);
            }
            applied.insert(incoming.clone());
        }
    }

    let RequestContext { rules, directives } = ctx;
    let refresh = |protocol: Protocol, props: &mut DirectiveSet| {
        *props = resolve_rule_props(rules.get_known(protocol), std::mem::take(props));
    };
    refresh(Protocol::Delete, &mut directives.delete);
    refresh(Protocol::Filter, &mut directives.filter);
    refresh(Protocol::Disable, &mut directives.disable);
    refresh(Protocol::Ignore, &mut directives.ignore);
    refresh(Protocol::Enable, &mut directives.enable);

    for action in FILTER_PROMOTIONS {
        if directives.enable.contains(action) {
            directives.filter.insert(action);
        }
    }

    let switched_off = directives.ignore.union(&directives.filter);
    ignore_rules(rules, switched_off.iter(), phase);

    debug!(
        applied = applied.len(),
        remaining = rules.len(),
        phase = ?phase,
        "Rule layers merged"
    );
    applied
}
