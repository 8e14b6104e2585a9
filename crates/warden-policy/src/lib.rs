//! Policy core of an intercepting proxy.
//!
//! - [`parser`] turns free-form rule bodies into structured values.
//! - [`rules`] merges rule layers and applies ignore, filter and exclude
//!   directives to a request's rule set.
//! - [`connector`] opens origin connections with a single cipher-fallback
//!   retry.

pub mod config;
pub mod connector;
pub mod logging;
pub mod parser;
pub mod rules;

pub use config::Config;
pub use connector::{connect, ConnectError, ConnectOptions, OriginStream};
pub use parser::{parse_structured_text, ParsedValue};
pub use rules::{merge_rules, Phase, RequestContext, Rule, RuleSet};
