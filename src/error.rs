//! Error taxonomy for load-balanced execution.
//!
//! # Classes
//! - Selection failure: no eligible server, never retried
//! - Transport: socket-level failures, retriable and circuit-relevant by default
//! - Application: not retriable unless flagged, never circuit-relevant
//! - Abort: raised by a listener, always terminal
//! - Budget exceeded: synthetic wrappers carrying the last underlying cause

use std::fmt;

/// Socket-level failure kinds an operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    ConnectionRefused,
    ConnectTimeout,
    ReadTimeout,
    ConnectionReset,
    NoRouteToHost,
    UnknownHost,
}

impl TransportErrorKind {
    /// Kinds retried by the default policy.
    pub fn is_default_retriable(self) -> bool {
        matches!(
            self,
            TransportErrorKind::ConnectionRefused
                | TransportErrorKind::ConnectTimeout
                | TransportErrorKind::ReadTimeout
        )
    }

    /// Kinds meaning the server itself could not be reached.
    pub fn is_circuit_related(self) -> bool {
        !matches!(self, TransportErrorKind::UnknownHost)
    }

    /// A connect-phase failure: the request never reached the server.
    pub fn is_connection_failure(self) -> bool {
        matches!(
            self,
            TransportErrorKind::ConnectionRefused
                | TransportErrorKind::ConnectTimeout
                | TransportErrorKind::NoRouteToHost
                | TransportErrorKind::UnknownHost
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::ConnectionRefused => "connection refused",
            TransportErrorKind::ConnectTimeout => "connect timeout",
            TransportErrorKind::ReadTimeout => "read timeout",
            TransportErrorKind::ConnectionReset => "connection reset",
            TransportErrorKind::NoRouteToHost => "no route to host",
            TransportErrorKind::UnknownHost => "unknown host",
        };
        f.write_str(s)
    }
}

/// Deliberate stop signal raised by an execution listener.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("execution aborted: {reason}")]
pub struct AbortExecution {
    pub reason: String,
}

impl AbortExecution {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Flat classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoServerAvailable,
    Transport,
    ServerThrottled,
    Application,
    Aborted,
    Cancelled,
    RetriesExceeded,
    RetriesOnNextServerExceeded,
}

/// The error type flowing through operations, retry handlers and commands.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no server available for client {client}")]
    NoServerAvailable { client: String },

    #[error("{kind} talking to {server}: {message}")]
    Transport {
        kind: TransportErrorKind,
        server: String,
        message: String,
    },

    #[error("server {server} throttled the request")]
    ServerThrottled { server: String },

    #[error("application error: {message}")]
    Application {
        message: String,
        status: Option<u16>,
        /// Retry on any server regardless of policy.
        retriable: bool,
    },

    #[error(transparent)]
    Aborted(#[from] AbortExecution),

    #[error("execution cancelled")]
    Cancelled,

    #[error("number of retries exceeded on {server} after {attempts} attempts")]
    RetriesExceeded {
        server: String,
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    #[error("number of retries on next server exceeded: {servers_tried} servers tried, last {server} after {attempts} attempts")]
    RetriesOnNextServerExceeded {
        server: String,
        servers_tried: u32,
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    pub fn transport(
        kind: TransportErrorKind,
        server: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ClientError::Transport {
            kind,
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn application(message: impl Into<String>) -> Self {
        ClientError::Application {
            message: message.into(),
            status: None,
            retriable: false,
        }
    }

    pub fn retriable_application(message: impl Into<String>) -> Self {
        ClientError::Application {
            message: message.into(),
            status: None,
            retriable: true,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::NoServerAvailable { .. } => ErrorKind::NoServerAvailable,
            ClientError::Transport { .. } => ErrorKind::Transport,
            ClientError::ServerThrottled { .. } => ErrorKind::ServerThrottled,
            ClientError::Application { .. } => ErrorKind::Application,
            ClientError::Aborted(_) => ErrorKind::Aborted,
            ClientError::Cancelled => ErrorKind::Cancelled,
            ClientError::RetriesExceeded { .. } => ErrorKind::RetriesExceeded,
            ClientError::RetriesOnNextServerExceeded { .. } => {
                ErrorKind::RetriesOnNextServerExceeded
            }
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, ClientError::Aborted(_))
    }

    /// The transport kind, if this is a transport failure.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            ClientError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Walk budget wrappers down to the error the operation actually returned.
    pub fn last_cause(&self) -> &ClientError {
        match self {
            ClientError::RetriesExceeded { source, .. }
            | ClientError::RetriesOnNextServerExceeded { source, .. } => source.last_cause(),
            other => other,
        }
    }

    /// True when no attempt reached a server (selection or connect-phase failure).
    pub fn never_reached_server(&self) -> bool {
        match self.last_cause() {
            ClientError::NoServerAvailable { .. } => true,
            ClientError::Transport { kind, .. } => kind.is_connection_failure(),
            _ => false,
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<crate::config::validation::ValidationError>),

    #[error("unknown selection rule '{0}'")]
    UnknownRule(String),
}

fn join_errors(errors: &[crate::config::validation::ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
