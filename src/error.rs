//! Error taxonomy for the presence bridge.
//!
//! Only credential, authentication and malformed setup input errors are meant
//! to reach the user (device state or setup wizard). Everything else is
//! absorbed where it happens and logged.

pub type Result<T> = std::result::Result<T, XboxError>;

#[derive(Debug, thiserror::Error)]
pub enum XboxError {
    /// No token set, or one that cannot be refreshed. Setup must be (re)run.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// Authorization-code exchange or token refresh rejected.
    #[error("authentication exchange failed: {0}")]
    AuthExchange(String),

    #[error("profile lookup failed: {0}")]
    ProfileLookup(String),

    #[error("presence fetch failed: {0}")]
    PresenceFetch(String),

    #[error("title lookup failed: {0}")]
    TitleLookup(String),

    #[error("artwork lookup failed: {0}")]
    Artwork(String),

    /// Redirect URL pasted during setup carries no `code` parameter.
    #[error("redirect URL has no authorization code: {0}")]
    MalformedRedirect(String),

    #[error("config load failed: {0}")]
    ConfigLoad(String),

    /// Upstream answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("transport session is closed")]
    TransportClosed,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl XboxError {
    /// Whether this failure must be surfaced to the device/setup layer.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            XboxError::MissingCredentials(_)
                | XboxError::AuthExchange(_)
                | XboxError::MalformedRedirect(_)
        )
    }

    /// Re-tag an upstream call failure as an auth exchange failure, keeping
    /// credential errors as they are.
    pub fn into_auth(self) -> Self {
        match self {
            e @ (XboxError::MissingCredentials(_) | XboxError::AuthExchange(_)) => e,
            other => XboxError::AuthExchange(other.to_string()),
        }
    }
}
