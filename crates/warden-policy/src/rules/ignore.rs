//! Ignore, filter and exclude resolution, and pruning of ignored rules.

use std::collections::BTreeSet;

use tracing::debug;

use super::directive::DirectiveSet;
use super::protocol::{self, canonical_name, is_plugin_name, is_proxy_name, Protocol};
use super::rule::RuleSet;
use super::Phase;

const IGNORE_ALL_KEYS: [&str; 4] = ["allRules", "allProtocols", "All", "*"];

/// Parsed form of an ignore directive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreResolution {
    pub ignore_all: bool,
    pub exclude: BTreeSet<String>,
    pub ignore: BTreeSet<String>,
}

impl IgnoreResolution {
    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude.contains(name)
    }
}

/// Classify the names of an ignore directive.
///
/// `ignore.x`, `ignore:x`, `-x` and `!x` exclude `x`; `*` and friends ignore
/// every known protocol. An excluded name never ends up in `ignore`, however
/// it got there.
pub fn resolve_ignore<I, S>(names: I) -> IgnoreResolution
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut resolution = IgnoreResolution::default();

    for key in names {
        let key = key.as_ref();
        if let Some(name) = key
            .strip_prefix("ignore.")
            .or_else(|| key.strip_prefix("ignore:"))
            .or_else(|| key.strip_prefix('-'))
            .or_else(|| key.strip_prefix('!'))
        {
            resolution.exclude.insert(name.to_string());
            continue;
        }

        let name = key.replacen("ignore|", "", 1);
        if name == "filter" || name == "ignore" {
            continue;
        }
        if IGNORE_ALL_KEYS.contains(&name.as_str()) {
            resolution.ignore_all = true;
            continue;
        }
        resolution.ignore.insert(canonical_name(&name).to_string());
    }

    if resolution.ignore_all {
        resolution.ignore = Protocol::ALL.iter().map(|p| p.as_str().to_string()).collect();
    }
    let IgnoreResolution { exclude, ignore, .. } = &mut resolution;
    ignore.retain(|name| !exclude.contains(name));

    resolution
}

/// Fold an ignore directive into a filter set.
///
/// Known protocols are recorded as-is and other names as `ignore|<name>`;
/// exclusions become `ignore:<name>`.
pub fn resolve_filter<I, S>(ignore_names: I, filter: Option<DirectiveSet>) -> DirectiveSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let resolution = resolve_ignore(ignore_names);
    let mut filter = filter.unwrap_or_default();

    for name in &resolution.ignore {
        if protocol::is_known(name) {
            filter.insert(name.as_str());
        } else {
            filter.insert(format!("ignore|{name}"));
        }
    }
    for name in &resolution.exclude {
        filter.insert(format!("ignore:{name}"));
    }
    if resolution.ignore_all {
        filter.insert("allRules");
    }
    filter
}

/// Whether `name` is switched off by `filter`.
pub fn is_ignored(filter: &DirectiveSet, name: &str) -> bool {
    !filter.contains(&format!("ignore:{name}"))
        && (filter.contains(name) || filter.contains(&format!("ignore|{name}")))
}

/// Remove the rules an ignore directive switches off.
///
/// During the response phase only response protocols are considered.
pub fn ignore_rules<I, S>(rules: &mut RuleSet, ignore_names: I, phase: Phase)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let resolution = resolve_ignore(ignore_names);
    let names: Vec<String> = if resolution.ignore_all {
        rules.names()
    } else {
        resolution.ignore.iter().cloned().collect()
    };

    for name in names {
        if name == "filter" || name == "ignore" || resolution.is_excluded(&name) {
            continue;
        }
        if phase == Phase::Response && !protocol::is_response_protocol(&name) {
            continue;
        }
        if ignore_plugins(rules, &name, &resolution)
            || ignore_proxy(rules, &name, &resolution)
            || ignore_forward_rule(rules, &name, &resolution)
        {
            continue;
        }
        if rules.remove(&name).is_some() {
            debug!(protocol = %name, "Ignored rule removed");
        }
    }
}

/// `plugin` drops every plugin entry; `plugin.<sub>` drops entries of that
/// plugin. Claims any plugin name.
fn ignore_plugins(rules: &mut RuleSet, name: &str, resolution: &IgnoreResolution) -> bool {
    let all_plugins = name == "plugin";
    if !all_plugins && !is_plugin_name(name) {
        return false;
    }
    let Some(plugin) = rules.get_mut("plugin") else {
        return true;
    };

    let should_drop = |scheme: Option<&str>| {
        let targeted = all_plugins || scheme == Some(name);
        targeted && !scheme.is_some_and(|s| resolution.is_excluded(s))
    };
    let now_empty = match plugin.list.as_mut() {
        Some(list) => {
            list.retain(|entry| !should_drop(entry.scheme()));
            list.is_empty()
        }
        None => should_drop(plugin.scheme()),
    };

    if now_empty {
        rules.remove("plugin");
        debug!(protocol = %name, "All plugin rules removed");
    }
    true
}

/// Names of the proxy family remove `rules.proxy` when they match its
/// scheme. Claims every proxy name once a proxy rule exists.
fn ignore_proxy(rules: &mut RuleSet, name: &str, resolution: &IgnoreResolution) -> bool {
    let Some(proxy) = rules.get("proxy") else {
        return false;
    };
    if name == "proxy" {
        rules.remove("proxy");
        debug!(protocol = %name, "Proxy rule removed");
        return true;
    }
    if !is_proxy_name(name) {
        return false;
    }

    let real_name = canonical_name(name);
    let matches_scheme = proxy.scheme().is_some_and(|scheme| {
        let real_scheme = canonical_name(scheme);
        real_name == real_scheme
            && !resolution.is_excluded(scheme)
            && !resolution.is_excluded(real_scheme)
            && !resolution.is_excluded(real_name)
    });
    if matches_scheme {
        rules.remove("proxy");
        debug!(protocol = %name, "Proxy rule removed by scheme");
    }
    true
}

/// `rule`, or the scheme of the forward rule, removes `rules.rule`. Names
/// with a rule of their own are left to the default removal.
fn ignore_forward_rule(rules: &mut RuleSet, name: &str, resolution: &IgnoreResolution) -> bool {
    let is_rule = name == "rule";
    if !is_rule && rules.contains(name) {
        return false;
    }
    if let Some(forward) = rules.get("rule") {
        let scheme = forward.scheme();
        let targeted = is_rule || scheme == Some(name);
        if targeted && !scheme.is_some_and(|s| resolution.is_excluded(s)) {
            rules.remove("rule");
            debug!(protocol = %name, "Forward rule removed");
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;

    fn rule_set(rules: &[(&str, &str)]) -> RuleSet {
        rules.iter().map(|(name, matcher)| Rule::new(*name, *matcher)).collect()
    }

    #[test]
    fn test_resolve_ignore_classifies_keys() {
        let resolution = resolve_ignore(["ignore.cookies", "-socks", "!host", "http-proxy", "filter", "ignore"]);
        assert!(!resolution.ignore_all);
        assert_eq!(
            resolution.exclude,
            ["cookies", "socks", "host"].into_iter().map(String::from).collect()
        );
        assert_eq!(resolution.ignore, ["proxy"].into_iter().map(String::from).collect());
    }

    #[test]
    fn test_resolve_ignore_strips_namespace() {
        let resolution = resolve_ignore(["ignore|reqHeaders", "ignore|ignore", "ignore:proxy"]);
        assert_eq!(resolution.ignore, ["reqHeaders"].into_iter().map(String::from).collect());
        assert!(resolution.is_excluded("proxy"));
    }

    #[test]
    fn test_exclude_wins() {
        let resolution = resolve_ignore(["ignore.cookies", "cookies"]);
        assert!(resolution.ignore.is_empty());
        assert!(resolution.is_excluded("cookies"));

        let filter = resolve_filter(["ignore.cookies", "cookies"], None);
        assert!(!is_ignored(&filter, "cookies"));
    }

    #[test]
    fn test_ignore_all_expands_to_registry() {
        let resolution = resolve_ignore(["*", "-socks"]);
        assert!(resolution.ignore_all);
        assert!(!resolution.ignore.contains("socks"));
        assert_eq!(resolution.ignore.len(), Protocol::ALL.len() - 1);
        for protocol in Protocol::ALL.iter().filter(|p| **p != Protocol::Socks) {
            assert!(resolution.ignore.contains(protocol.as_str()));
        }
    }

    #[test]
    fn test_ignore_all_keys() {
        for key in IGNORE_ALL_KEYS {
            assert!(resolve_ignore([key]).ignore_all, "{key}");
        }
    }

    #[test]
    fn test_resolve_filter() {
        let base: DirectiveSet = ["intercept"].into_iter().collect();
        let filter = resolve_filter(["reqHeaders", "customThing", "-proxy", "*"], Some(base));
        assert!(filter.contains("intercept"));
        assert!(filter.contains("reqHeaders"));
        assert!(filter.contains("ignore:proxy"));
        assert!(filter.contains("allRules"));
        assert!(!filter.contains("proxy"));

        let filter = resolve_filter(["customThing"], None);
        assert!(filter.contains("ignore|customThing"));
        assert!(is_ignored(&filter, "customThing"));
    }

    #[test]
    fn test_is_ignored() {
        let filter: DirectiveSet = ["host", "ignore|x", "ignore:x", "ignore:host2", "host2"].into_iter().collect();
        assert!(is_ignored(&filter, "host"));
        assert!(!is_ignored(&filter, "x"));
        assert!(!is_ignored(&filter, "host2"));
        assert!(!is_ignored(&filter, "proxy"));
    }

    #[test]
    fn test_ignore_default_removal() {
        let mut rules = rule_set(&[("host", "host://1.1.1.1"), ("reqHeaders", "reqHeaders://a=1")]);
        ignore_rules(&mut rules, ["hosts"], Phase::Request);
        assert!(!rules.contains("host"));
        assert!(rules.contains("reqHeaders"));
    }

    #[test]
    fn test_ignore_proxy_by_scheme() {
        let mut rules = rule_set(&[("proxy", "socks://x")]);
        ignore_rules(&mut rules, ["socks"], Phase::Request);
        assert!(!rules.contains("proxy"));

        let mut rules = rule_set(&[("proxy", "socks://x")]);
        ignore_rules(&mut rules, ["socks", "-socks"], Phase::Request);
        assert!(rules.contains("proxy"));
    }

    #[test]
    fn test_ignore_proxy_alias_scheme() {
        let mut rules = rule_set(&[("proxy", "http-proxy://127.0.0.1:8888")]);
        ignore_rules(&mut rules, ["socks"], Phase::Request);
        assert!(rules.contains("proxy"));
        ignore_rules(&mut rules, ["proxy"], Phase::Request);
        assert!(!rules.contains("proxy"));

        let mut rules = rule_set(&[("proxy", "http-proxy://127.0.0.1:8888")]);
        ignore_rules(&mut rules, ["http-proxy"], Phase::Request);
        assert!(!rules.contains("proxy"));
    }

    #[test]
    fn test_ignore_proxy_name_without_proxy_rule() {
        let mut rules = rule_set(&[("socks", "socks://kept")]);
        ignore_rules(&mut rules, ["socks"], Phase::Request);
        assert!(!rules.contains("socks"));
    }

    #[test]
    fn test_ignore_plugins() {
        let plugin = Rule::from_matchers(
            "plugin",
            ["plugin.foo://a", "plugin.bar://b", "plugin.foo://c"],
        )
        .unwrap();
        let mut rules: RuleSet = [plugin].into_iter().collect();

        ignore_rules(&mut rules, ["plugin.foo"], Phase::Request);
        let left: Vec<_> = rules.get("plugin").unwrap().entries().iter().map(|r| r.matcher.as_str()).collect();
        assert_eq!(left, vec!["plugin.bar://b"]);

        ignore_rules(&mut rules, ["plugin.bar"], Phase::Request);
        assert!(!rules.contains("plugin"));
    }

    #[test]
    fn test_ignore_all_plugins_respects_exclude() {
        let plugin = Rule::from_matchers("plugin", ["plugin.foo://a", "plugin.bar://b"]).unwrap();
        let mut rules: RuleSet = [plugin].into_iter().collect();

        ignore_rules(&mut rules, ["plugin", "-plugin.bar"], Phase::Request);
        let left: Vec<_> = rules.get("plugin").unwrap().entries().iter().map(|r| r.matcher.as_str()).collect();
        assert_eq!(left, vec!["plugin.bar://b"]);
    }

    #[test]
    fn test_ignore_plugin_malformed_matcher() {
        let plugin = Rule::from_matchers("plugin", ["plugin.foo", "plugin.bar://b"]).unwrap();
        let mut rules: RuleSet = [plugin].into_iter().collect();

        ignore_rules(&mut rules, ["plugin.foo"], Phase::Request);
        assert_eq!(rules.get("plugin").unwrap().entries().len(), 2);

        ignore_rules(&mut rules, ["plugin"], Phase::Request);
        assert!(!rules.contains("plugin"));
    }

    #[test]
    fn test_ignore_forward_rule() {
        let mut rules = rule_set(&[("rule", "file:///tmp/index.html")]);
        ignore_rules(&mut rules, ["rule"], Phase::Request);
        assert!(!rules.contains("rule"));

        let mut rules = rule_set(&[("rule", "file:///tmp/index.html")]);
        ignore_rules(&mut rules, ["file"], Phase::Request);
        assert!(!rules.contains("rule"));

        let mut rules = rule_set(&[("rule", "file:///tmp/index.html")]);
        ignore_rules(&mut rules, ["rule", "-file"], Phase::Request);
        assert!(rules.contains("rule"));
    }

    #[test]
    fn test_forward_rule_claims_unrelated_names() {
        let mut rules = rule_set(&[("rule", "file:///tmp/a"), ("host", "host://1.1.1.1")]);
        ignore_rules(&mut rules, ["host", "statusCode"], Phase::Request);
        assert!(!rules.contains("host"));
        assert!(rules.contains("rule"));
    }

    #[test]
    fn test_ignore_all_clears_rule_set() {
        let mut rules = rule_set(&[
            ("proxy", "socks://x"),
            ("rule", "file:///a"),
            ("reqHeaders", "reqHeaders://a=1"),
            ("customThing", "customThing://1"),
        ]);
        ignore_rules(&mut rules, ["*"], Phase::Request);
        assert!(rules.is_empty(), "{:?}", rules.names());
    }

    #[test]
    fn test_response_phase_only_prunes_response_protocols() {
        let mut rules = rule_set(&[("reqHeaders", "reqHeaders://a=1"), ("resHeaders", "resHeaders://b=2")]);
        ignore_rules(&mut rules, ["reqHeaders", "resHeaders"], Phase::Response);
        assert!(rules.contains("reqHeaders"));
        assert!(!rules.contains("resHeaders"));
    }
}
