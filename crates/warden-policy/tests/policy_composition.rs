//! End-to-end composition of request rule sets.

use serde_json::json;
use warden_policy::parser::parse_structured_text;
use warden_policy::rules::protocol::Protocol;
use warden_policy::rules::{
    ignore_rules, is_ignored, merge_rule, merge_rules, resolve_filter, resolve_ignore, Phase,
    RequestContext, Rule, RuleSet,
};

fn rule_set(rules: &[(&str, &str)]) -> RuleSet {
    rules
        .iter()
        .map(|(name, matcher)| Rule::new(*name, *matcher))
        .collect()
}

#[test]
fn test_exclude_beats_ignore() {
    let resolution = resolve_ignore(["ignore.cookies", "cookies"]);
    assert!(resolution.ignore.is_empty());
    assert!(resolution.exclude.contains("cookies"));

    let filter = resolve_filter(["ignore.cookies", "cookies"], None);
    assert!(!is_ignored(&filter, "cookies"));
}

#[test]
fn test_ignore_all_with_exclude() {
    let resolution = resolve_ignore(["*", "-socks"]);
    assert!(resolution.ignore_all);
    let mut expected: Vec<&str> = Protocol::ALL
        .iter()
        .map(Protocol::as_str)
        .filter(|name| *name != "socks")
        .collect();
    expected.sort_unstable();
    let actual: Vec<&str> = resolution.ignore.iter().map(String::as_str).collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_plugin_merge_keeps_one_entry_per_plugin() {
    let current = Rule::from_matchers("plugin", ["plugin.foo://a", "plugin.bar://a"]).unwrap();
    let incoming = Rule::from_matchers("plugin", ["plugin.foo://b", "plugin.bar://b"]).unwrap();
    let merged = merge_rule(Some(current), Some(incoming)).unwrap();

    let matchers: Vec<&str> = merged.entries().iter().map(|r| r.matcher.as_str()).collect();
    assert_eq!(matchers, vec!["plugin.foo://a", "plugin.bar://a"]);
}

#[test]
fn test_proxy_removed_by_scheme_unless_excluded() {
    let mut rules = rule_set(&[("proxy", "socks://x")]);
    ignore_rules(&mut rules, ["socks"], Phase::Request);
    assert!(rules.get("proxy").is_none());

    let mut rules = rule_set(&[("proxy", "socks://x")]);
    ignore_rules(&mut rules, ["socks", "ignore:socks"], Phase::Request);
    assert!(rules.get("proxy").is_some());
}

#[test]
fn test_layered_request() {
    let mut base = rule_set(&[
        ("host", "host://10.0.0.2"),
        ("proxy", "http-proxy://127.0.0.1:8888"),
        ("reqHeaders", "reqHeaders://x-debug=1"),
        ("rule", "file:///var/www/index.html"),
    ]);
    base.insert(Rule::from_matchers("plugin", ["plugin.inspect://on"]).unwrap());
    let mut ctx = RequestContext::new(base);

    let overrides: RuleSet = [
        Rule::from_matchers("plugin", ["plugin.inspect://off", "plugin.mock://on"]).unwrap(),
        Rule::new("ignore", "ignore://http-proxy|file|-host"),
        Rule::new("enable", "enable://intercept|abort"),
    ]
    .into_iter()
    .collect();

    let applied = merge_rules(&mut ctx, Some(&overrides), Phase::Request);
    assert_eq!(applied.len(), 3);

    assert!(ctx.rules.get("proxy").is_none(), "http-proxy matches the proxy scheme");
    assert!(ctx.rules.get("rule").is_none(), "file matches the forward rule scheme");
    assert!(ctx.rules.get("host").is_some());
    assert!(ctx.rules.get("reqHeaders").is_some());

    let plugin_matchers: Vec<&str> = ctx
        .rules
        .get("plugin")
        .unwrap()
        .entries()
        .iter()
        .map(|r| r.matcher.as_str())
        .collect();
    assert_eq!(plugin_matchers, vec!["plugin.inspect://on", "plugin.mock://on"]);

    assert!(ctx.directives.filter.contains("intercept"));
    assert!(!ctx.directives.filter.contains("abort"));
    assert!(ctx.directives.ignore.contains("-host"));

    let headers = ctx.rules.get("reqHeaders").unwrap().parsed_value();
    assert_eq!(headers, Some(json!({"x-debug": "1"})));
}

#[test]
fn test_response_phase_leaves_request_rules() {
    let mut ctx = RequestContext::new(rule_set(&[
        ("reqHeaders", "reqHeaders://a=1"),
        ("resHeaders", "resHeaders://b=2"),
    ]));
    let late: RuleSet = [
        Rule::new("ignore", "ignore://reqHeaders|resHeaders"),
        Rule::new("reqCors", "reqCors://*"),
    ]
    .into_iter()
    .collect();

    let applied = merge_rules(&mut ctx, Some(&late), Phase::Response);
    assert_eq!(applied.names(), vec!["ignore"]);
    assert!(ctx.rules.get("reqCors").is_none());
    assert!(ctx.rules.get("reqHeaders").is_some());
    assert!(ctx.rules.get("resHeaders").is_none());
}

#[test]
fn test_rule_values_parse_into_structures() {
    let rule = Rule::new("resHeaders", "resHeaders://{\"x-cache\": \"miss\"}");
    assert_eq!(rule.parsed_value(), Some(json!({"x-cache": "miss"})));

    let body = "[[0].name]: first\n[[1].name]: second\n[[1].tags[0]]: a";
    assert_eq!(
        parse_structured_text(body),
        Some(json!([{"name": "first"}, {"name": "second", "tags": ["a"]}]))
    );
}
