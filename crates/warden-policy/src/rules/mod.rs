//! Rule composition.
//!
//! A request carries a [`RuleSet`] selected by the matcher. Later layers are
//! merged in with [`merge_rules`], which also refreshes the request's
//! [`DirectiveMaps`] and prunes every rule an `ignore` or `filter` directive
//! switches off. Exclusions (`-name`, `ignore:name`) always beat ignores.

pub mod directive;
pub mod ignore;
pub mod merge;
pub mod protocol;
pub mod rule;

pub use directive::{parse_line_props, resolve_rule_props, DirectiveMaps, DirectiveSet};
pub use ignore::{ignore_rules, is_ignored, resolve_filter, resolve_ignore, IgnoreResolution};
pub use merge::{filter_repeat_plugin, merge_rule, merge_rules, RequestContext};
pub use protocol::Protocol;
pub use rule::{ProtocolKey, Rule, RuleSet};

/// Processing phase of the request a composition runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Request,
    /// The response has arrived; only response protocols are touched.
    Response,
}
