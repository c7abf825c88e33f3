use crate::api::scrub::scrub_secrets;
use crate::api::HttpMethod;

// ==============================================================================
// Transport Failure Classification
// ==============================================================================

/// Coarse classification of a transport failure.
///
/// Drives the POST failover allow-list: only failures where the request
/// provably never reached the node's API handler may be replayed elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    ConnectionRefused,
    HostUnreachable,
    TlsHandshakeTimeout,
    RemoteError,
    CertificateExpired,
    Timeout,
    Other,
}

impl TransportKind {
    /// Whether a POST that failed this way may be sent to another node.
    pub fn safe_to_replay(self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused
                | Self::HostUnreachable
                | Self::TlsHandshakeTimeout
                | Self::RemoteError
                | Self::CertificateExpired
        )
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::HostUnreachable => write!(f, "host unreachable"),
            Self::TlsHandshakeTimeout => write!(f, "TLS handshake timeout"),
            Self::RemoteError => write!(f, "remote error"),
            Self::CertificateExpired => write!(f, "certificate expired"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}

// ==============================================================================
// Node API Errors
// ==============================================================================

/// Failure of a single request against a single upstream node.
///
/// Every message is passed through [`scrub_secrets`] on construction, so
/// rendering any variant never leaks a `secretPhrase` query value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("transport failure ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("invalid node response: {0}")]
    Decode(String),

    #[error("node error {code}: {description}")]
    Domain { code: i64, description: String },
}

impl ApiError {
    pub fn transport(kind: TransportKind, message: impl AsRef<str>) -> Self {
        Self::Transport {
            kind,
            message: scrub_secrets(message.as_ref()),
        }
    }

    pub fn decode(message: impl AsRef<str>) -> Self {
        Self::Decode(scrub_secrets(message.as_ref()))
    }

    pub fn domain(code: i64, description: impl AsRef<str>) -> Self {
        Self::Domain {
            code,
            description: scrub_secrets(description.as_ref()),
        }
    }

    /// Decide whether the pool may try the next upstream after this error.
    ///
    /// Domain errors are final for every method. GETs are idempotent and fail
    /// over on anything else. POSTs fail over only on HTTP status errors and
    /// on the transport kinds in [`TransportKind::safe_to_replay`]; a POST
    /// that may have been executed must not be replayed on another node.
    pub fn allows_failover(&self, method: HttpMethod) -> bool {
        match self {
            Self::Domain { .. } => false,
            _ if method == HttpMethod::Get => true,
            Self::HttpStatus(_) => true,
            Self::Transport { kind, .. } => kind.safe_to_replay(),
            Self::Decode(_) => false,
        }
    }
}

// ==============================================================================
// Core Errors
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("couldn't get {request_type} method: {source}")]
    Exhausted {
        request_type: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("no upstream nodes available")]
    NoUpstreams,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("watermark store failure: {0}")]
    WatermarkStore(String),

    #[error("service is shutting down")]
    Shutdown,

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl CoreError {
    /// The node-level error behind this failure, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) | Self::Exhausted { source: err, .. } => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::WatermarkStore(err.to_string())
    }
}
