use thiserror::Error;
use url::Url;

/// Failure kinds surfaced by the resolution pipeline.
///
/// `Clone` because a promise replays its single settlement to every
/// observer registered on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Upstream content was malformed or not what the adapter expected.
    #[error("unexpected response: {0}")]
    Response(String),

    /// No handler for the requested server, or a handler failed internally.
    #[error("provider error: {0}")]
    Provider(String),

    /// Nothing matched a search query.
    #[error("search error: {0}")]
    Search(String),

    /// The upstream requires a credential that has not been supplied yet.
    #[error("authentication required: {message}")]
    AuthenticationRequired {
        message: String,
        remediation: Option<Url>,
    },

    /// Region or availability block.
    #[error("content unavailable: {0}")]
    ContentUnavailable(String),

    /// Deliberate abort. Not a user-facing failure.
    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    pub fn response(message: impl Into<String>) -> Self {
        Self::Response(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    pub fn search(message: impl Into<String>) -> Self {
        Self::Search(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ContentUnavailable(message.into())
    }

    pub fn authentication_required(message: impl Into<String>, remediation: Option<Url>) -> Self {
        Self::AuthenticationRequired {
            message: message.into(),
            remediation,
        }
    }

    /// The "no supported server" provider error.
    pub fn no_supported_server(content: &str) -> Self {
        Self::Provider(format!("no supported server for {content}"))
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Response(_) => "response",
            Self::Provider(_) => "provider",
            Self::Search(_) => "search",
            Self::AuthenticationRequired { .. } => "authentication_required",
            Self::ContentUnavailable(_) => "content_unavailable",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
