//! The fixed repertoire of directive categories.
//!
//! A protocol name here is a kind of directive (`proxy`, `reqHeaders`,
//! `plugin`, ...), not a network protocol. Names outside the repertoire are
//! still valid rule keys; [`RuleSet`](super::RuleSet) keeps them in a
//! separate open map.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

macro_rules! protocols {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Directive categories known to the policy core.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Protocol {
            $($variant),+
        }

        impl Protocol {
            /// Every known protocol, in registry order.
            pub const ALL: &'static [Protocol] = &[$(Protocol::$variant),+];

            /// Get protocol name as written in rules
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Protocol::$variant => $name),+
                }
            }

            /// Look up a protocol by its exact (already alias-normalized) name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Protocol::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

protocols! {
    Style => "style",
    Host => "host",
    Rule => "rule",
    Pipe => "pipe",
    Proxy => "proxy",
    Xproxy => "xproxy",
    HttpsProxy => "https-proxy",
    XhttpsProxy => "xhttps-proxy",
    Socks => "socks",
    Xsocks => "xsocks",
    InternalProxy => "internal-proxy",
    InternalHttpsProxy => "internal-https-proxy",
    Pac => "pac",
    Filter => "filter",
    Ignore => "ignore",
    Enable => "enable",
    Disable => "disable",
    Delete => "delete",
    Log => "log",
    Plugin => "plugin",
    Referer => "referer",
    Auth => "auth",
    Ua => "ua",
    UrlParams => "urlParams",
    Params => "params",
    ResMerge => "resMerge",
    StatusCode => "statusCode",
    ReplaceStatus => "replaceStatus",
    Redirect => "redirect",
    Method => "method",
    Cache => "cache",
    Attachment => "attachment",
    Location => "location",
    ForwardedFor => "forwardedFor",
    ResponseFor => "responseFor",
    RulesFile => "rulesFile",
    ResScript => "resScript",
    ReqDelay => "reqDelay",
    ResDelay => "resDelay",
    ReqSpeed => "reqSpeed",
    ResSpeed => "resSpeed",
    ReqHeaders => "reqHeaders",
    ResHeaders => "resHeaders",
    Trailers => "trailers",
    ReqType => "reqType",
    ResType => "resType",
    ReqCharset => "reqCharset",
    ResCharset => "resCharset",
    ReqCookies => "reqCookies",
    ResCookies => "resCookies",
    ReqCors => "reqCors",
    ResCors => "resCors",
    ReqPrepend => "reqPrepend",
    ResPrepend => "resPrepend",
    ReqBody => "reqBody",
    ResBody => "resBody",
    ReqAppend => "reqAppend",
    ResAppend => "resAppend",
    UrlReplace => "urlReplace",
    ReqReplace => "reqReplace",
    ResReplace => "resReplace",
    ReqWrite => "reqWrite",
    ResWrite => "resWrite",
    ReqWriteRaw => "reqWriteRaw",
    ResWriteRaw => "resWriteRaw",
    CssAppend => "cssAppend",
    HtmlAppend => "htmlAppend",
    JsAppend => "jsAppend",
    CssBody => "cssBody",
    HtmlBody => "htmlBody",
    JsBody => "jsBody",
    CssPrepend => "cssPrepend",
    HtmlPrepend => "htmlPrepend",
    JsPrepend => "jsPrepend",
    HeaderReplace => "headerReplace",
    Cipher => "cipher",
    SniCallback => "sniCallback",
    LineProps => "lineProps",
}

impl Protocol {
    /// Whether rules of this kind still apply once the response has arrived.
    pub fn applies_to_response(&self) -> bool {
        matches!(
            self,
            Protocol::Style
                | Protocol::Filter
                | Protocol::Ignore
                | Protocol::Enable
                | Protocol::Disable
                | Protocol::Delete
                | Protocol::Log
                | Protocol::Plugin
                | Protocol::ResMerge
                | Protocol::ReplaceStatus
                | Protocol::Cache
                | Protocol::Attachment
                | Protocol::Location
                | Protocol::ResponseFor
                | Protocol::ResScript
                | Protocol::ResDelay
                | Protocol::ResSpeed
                | Protocol::ResHeaders
                | Protocol::Trailers
                | Protocol::ResType
                | Protocol::ResCharset
                | Protocol::ResCookies
                | Protocol::ResCors
                | Protocol::ResPrepend
                | Protocol::ResBody
                | Protocol::ResAppend
                | Protocol::ResReplace
                | Protocol::ResWrite
                | Protocol::ResWriteRaw
                | Protocol::CssAppend
                | Protocol::HtmlAppend
                | Protocol::JsAppend
                | Protocol::CssBody
                | Protocol::HtmlBody
                | Protocol::JsBody
                | Protocol::CssPrepend
                | Protocol::HtmlPrepend
                | Protocol::JsPrepend
                | Protocol::HeaderReplace
                | Protocol::LineProps
        )
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alternative spellings accepted in rules and ignore directives.
static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("ruleFile", "rulesFile"),
        ("ruleScript", "rulesFile"),
        ("rulesScript", "rulesFile"),
        ("reqScript", "rulesFile"),
        ("reqRules", "rulesFile"),
        ("resRules", "resScript"),
        ("pathReplace", "urlReplace"),
        ("download", "attachment"),
        ("http-proxy", "proxy"),
        ("xhttp-proxy", "xproxy"),
        ("status", "statusCode"),
        ("hosts", "host"),
        ("xhost", "host"),
        ("html", "htmlAppend"),
        ("js", "jsAppend"),
        ("css", "cssAppend"),
        ("reqMerge", "params"),
        ("excludeFilter", "filter"),
        ("includeFilter", "filter"),
    ])
});

static PLUGIN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^plugin\.[a-z\d_\-]+$").expect("valid plugin name regex"));
static PROXY_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^x?(?:socks|https?-proxy|proxy|internal(?:-https)?-proxy)$")
        .expect("valid proxy name regex")
});

/// Resolve an alias to its canonical protocol name; other names pass through.
pub fn canonical_name(name: &str) -> &str {
    ALIASES.get(name).copied().unwrap_or(name)
}

/// Whether `name` is in the fixed repertoire (after no alias resolution).
pub fn is_known(name: &str) -> bool {
    Protocol::from_name(name).is_some()
}

/// Whether rules named `name` may be merged or pruned during the response
/// phase. Names outside the repertoire never are.
pub fn is_response_protocol(name: &str) -> bool {
    Protocol::from_name(name).is_some_and(|p| p.applies_to_response())
}

/// `plugin.<sub>` names addressing a single plugin.
pub fn is_plugin_name(name: &str) -> bool {
    PLUGIN_NAME_RE.is_match(name)
}

/// Names whose rules are stored under `proxy` (`socks`, `https-proxy`, ...).
pub fn is_proxy_name(name: &str) -> bool {
    PROXY_NAME_RE.is_match(name)
}
