//! Outbound connections to origin servers.
//!
//! [`connect`] makes at most two attempts. The first runs under a short
//! timeout; any failure, a timeout included, is followed by one retry under
//! a longer one. When a TLS handshake was cut off during cipher negotiation,
//! the retry offers a single broadly supported suite instead (see
//! [`tls::resolve_cipher`]). Exactly one result is returned per call, and a
//! failed attempt's socket is closed before the next one starts.

mod error;
mod stream;
pub mod tls;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

pub use error::ConnectError;
pub use stream::OriginStream;

use crate::config::ConnectorConfig;
use crate::rules::RuleSet;

/// Attempts made before giving up.
pub const MAX_ATTEMPTS: u8 = 2;

/// What to connect to and how.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    /// Present for TLS connections, even when empty.
    pub alpn_protocols: Option<Vec<String>>,
    /// Cipher offered on the first attempt.
    pub ciphers: Option<String>,
    /// Rules of the request; a `cipher` rule picks the retry cipher.
    pub rules: Option<RuleSet>,
    /// SNI override, defaults to `host`.
    pub server_name: Option<String>,
    pub skip_verify: bool,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_alpn<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alpn_protocols = Some(protocols.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_ciphers(mut self, ciphers: impl Into<String>) -> Self {
        self.ciphers = Some(ciphers.into());
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn uses_tls(&self) -> bool {
        self.alpn_protocols.is_some()
    }

    /// `host:port`, for logs and errors.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TLS parameters of one attempt.
#[derive(Debug, Clone)]
pub struct TlsTarget {
    pub server_name: ServerName<'static>,
    pub config: Arc<ClientConfig>,
}

/// A single planned connection attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u8,
    pub host: String,
    pub port: u16,
    pub cipher: Option<String>,
    pub tls: Option<TlsTarget>,
}

impl Attempt {
    /// Prepare attempt `number`. Fails without touching the network when the
    /// server name or TLS configuration is invalid.
    pub fn plan(
        options: &ConnectOptions,
        number: u8,
        cipher: Option<&str>,
        config: &ConnectorConfig,
    ) -> Result<Self, ConnectError> {
        let tls = match &options.alpn_protocols {
            None => None,
            Some(alpn) => {
                let name = options.server_name.as_deref().unwrap_or(&options.host);
                let server_name = tls::server_name(name)
                    .ok_or_else(|| ConnectError::InvalidServerName(name.to_string()))?;
                let skip_verify = options.skip_verify || config.skip_tls_verify;
                let client_config = tls::build_client_config(alpn, cipher, skip_verify)?;
                Some(TlsTarget {
                    server_name,
                    config: Arc::new(client_config),
                })
            }
        };

        Ok(Self {
            number,
            host: options.host.clone(),
            port: options.port,
            cipher: cipher.map(str::to_string),
            tls,
        })
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Host without IPv6 brackets.
    fn dial_host(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }
}

/// Opens the socket for one attempt.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Stream: Send;

    async fn dial(&self, attempt: &Attempt) -> io::Result<Self::Stream>;
}

/// Dials over TCP, with a TLS handshake when the attempt asks for one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTlsDialer;

#[async_trait]
impl Dialer for TcpTlsDialer {
    type Stream = OriginStream;

    async fn dial(&self, attempt: &Attempt) -> io::Result<OriginStream> {
        let tcp = TcpStream::connect((attempt.dial_host(), attempt.port)).await?;
        tcp.set_nodelay(true)?;

        match &attempt.tls {
            None => Ok(OriginStream::Plain(tcp)),
            Some(tls) => {
                let connector = TlsConnector::from(tls.config.clone());
                let stream = connector.connect(tls.server_name.clone(), tcp).await?;
                Ok(OriginStream::Tls(stream))
            }
        }
    }
}

/// Progress of one `connect` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Connecting { attempt: u8 },
    Established,
    Failed,
}

impl AttemptState {
    pub fn start(self) -> Self {
        match self {
            AttemptState::Idle => AttemptState::Connecting { attempt: 1 },
            other => other,
        }
    }

    pub fn succeed(self) -> Self {
        match self {
            AttemptState::Connecting { .. } => AttemptState::Established,
            other => other,
        }
    }

    pub fn fail(self) -> Self {
        match self {
            AttemptState::Connecting { attempt } if attempt < MAX_ATTEMPTS => {
                AttemptState::Connecting { attempt: attempt + 1 }
            }
            AttemptState::Connecting { .. } => AttemptState::Failed,
            other => other,
        }
    }

    /// Number of the attempt in flight.
    pub fn attempt(&self) -> Option<u8> {
        match self {
            AttemptState::Connecting { attempt } => Some(*attempt),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Established | AttemptState::Failed)
    }
}

/// Whether `err` looks like a handshake aborted over cipher negotiation.
pub fn is_cipher_error(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof
    ) {
        return true;
    }
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|tls_err| {
            matches!(
                tls_err,
                rustls::Error::AlertReceived(_)
                    | rustls::Error::PeerIncompatible(_)
                    | rustls::Error::PeerMisbehaved(_)
                    | rustls::Error::InappropriateMessage { .. }
                    | rustls::Error::InappropriateHandshakeMessage { .. }
                    | rustls::Error::DecryptError
            )
        })
}

/// The error a timed out attempt fails with.
pub fn timeout_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "Timeout")
}

/// Connect to an origin over TCP, or TLS when ALPN protocols are given.
pub async fn connect(
    options: &ConnectOptions,
    config: &ConnectorConfig,
) -> Result<OriginStream, ConnectError> {
    connect_with(&TcpTlsDialer, options, config).await
}

/// [`connect`] through a custom dialer.
pub async fn connect_with<D: Dialer>(
    dialer: &D,
    options: &ConnectOptions,
    config: &ConnectorConfig,
) -> Result<D::Stream, ConnectError> {
    let target = options.target();
    let fallback_cipher = tls::rule_cipher(options.rules.as_ref())
        .or_else(|| tls::canonical_cipher(&config.fallback_cipher))
        .unwrap_or(tls::DEFAULT_CIPHER);

    let mut cipher = options.ciphers.clone();
    let mut state = AttemptState::Idle.start();
    let mut last_error = None;

    while let Some(number) = state.attempt() {
        let attempt = Attempt::plan(options, number, cipher.as_deref(), config)?;
        let timeout = config.timeout_for(number);
        debug!(
            origin = %target,
            attempt = number,
            tls = attempt.is_tls(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "Connecting to origin"
        );

        match dial_within(dialer, &attempt, timeout).await {
            Ok(stream) => {
                state = state.succeed();
                info!(origin = %target, attempt = number, state = ?state, "Origin connection established");
                return Ok(stream);
            }
            Err(err) => {
                state = state.fail();
                if state.is_terminal() {
                    warn!(origin = %target, attempt = number, error = %err, "Origin connection failed");
                } else {
                    if attempt.is_tls() && is_cipher_error(&err) {
                        cipher = Some(fallback_cipher.to_string());
                    }
                    warn!(
                        origin = %target,
                        attempt = number,
                        error = %err,
                        cipher = cipher.as_deref().unwrap_or("default"),
                        "Origin connection attempt failed, retrying"
                    );
                }
                last_error = Some(err);
            }
        }
    }

    let source = last_error.unwrap_or_else(|| io::Error::other("no connection attempt was made"));
    Err(ConnectError::Exhausted {
        target,
        attempts: MAX_ATTEMPTS,
        source,
    })
}

/// Run one attempt; the dial future, and any socket it holds, is dropped when
/// the timeout fires.
async fn dial_within<D: Dialer>(
    dialer: &D,
    attempt: &Attempt,
    timeout: Duration,
) -> io::Result<D::Stream> {
    match tokio::time::timeout(timeout, dialer.dial(attempt)).await {
        Ok(result) => result,
        Err(_) => Err(timeout_error()),
    }
}
