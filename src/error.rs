use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Errors surfaced by the mailbox provider (Gmail API) and local setup
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed or the access token expired (401)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource already exists (409), e.g. a label with the same name
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Label-related errors
    #[error("Label error: {0}")]
    LabelError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GmailError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GmailError::RateLimitExceeded { .. }
                | GmailError::ServerError { .. }
                | GmailError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// The provider refused a create because the resource already exists
    pub fn is_conflict(&self) -> bool {
        matches!(self, GmailError::Conflict(_))
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, GmailError::AuthError(_))
    }
}

/// Failures of the auto-reply pipeline.
///
/// Per-message variants (`HeaderMissing`, `MetadataFailure`, `InvalidReply`,
/// `SendFailure`, `TransitionFailure`) are isolated by the orchestrator: the
/// message stays unread in the inbox and is picked up again next cycle. `ScanFailure` and
/// `LabelFailure` abort the current cycle only.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Message {message_id} has no '{header}' header")]
    HeaderMissing {
        message_id: String,
        header: &'static str,
    },

    #[error("Failed to fetch headers of message {message_id}: {source}")]
    MetadataFailure {
        message_id: String,
        #[source]
        source: GmailError,
    },

    #[error("Cannot build a reply to message {message_id}: {source}")]
    InvalidReply {
        message_id: String,
        #[source]
        source: GmailError,
    },

    #[error("Failed to send reply to message {message_id}: {source}")]
    SendFailure {
        message_id: String,
        #[source]
        source: GmailError,
    },

    #[error("Failed to mark message {message_id} as handled: {source}")]
    TransitionFailure {
        message_id: String,
        #[source]
        source: GmailError,
    },

    #[error("Scanning for unread messages failed: {0}")]
    ScanFailure(#[source] GmailError),

    #[error("Failed to ensure label '{name}': {source}")]
    LabelFailure {
        name: String,
        #[source]
        source: GmailError,
    },
}

impl ProcessingError {
    /// Message the error belongs to, if it is a per-message failure
    pub fn message_id(&self) -> Option<&str> {
        match self {
            ProcessingError::HeaderMissing { message_id, .. }
            | ProcessingError::MetadataFailure { message_id, .. }
            | ProcessingError::InvalidReply { message_id, .. }
            | ProcessingError::SendFailure { message_id, .. }
            | ProcessingError::TransitionFailure { message_id, .. } => Some(message_id),
            ProcessingError::ScanFailure(_) | ProcessingError::LabelFailure { .. } => None,
        }
    }

    /// Whether the failure ends the whole cycle rather than a single message
    pub fn is_cycle_level(&self) -> bool {
        self.message_id().is_none()
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Returns the number of seconds to wait. If the header is missing or invalid,
/// returns a default of 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                let now = std::time::SystemTime::now();
                if let Ok(duration) = http_date.duration_since(now) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

/// Map an HTTP status from the Gmail API onto the error taxonomy
fn from_status(status_code: u16, message: String, retry_after: u64) -> GmailError {
    match status_code {
        429 => GmailError::RateLimitExceeded { retry_after },
        409 => GmailError::Conflict(message),
        404 => GmailError::MessageNotFound(message),
        401 => GmailError::AuthError(message),
        400 => GmailError::BadRequest(message),
        403 => GmailError::Forbidden(message),
        500..=599 => GmailError::ServerError {
            status: status_code,
            message,
        },
        _ => GmailError::ApiError(message),
    }
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // Non-success response without a JSON error body
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let message = format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                );
                from_status(status.as_u16(), message, parse_retry_after_header(response))
            }
            // Non-success response with a JSON error body: {"error": {"code": 409, ...}}
            google_gmail1::Error::BadRequest(ref body) => {
                let code = body
                    .get("error")
                    .and_then(|e| e.get("code"))
                    .and_then(|c| c.as_u64())
                    .and_then(|c| u16::try_from(c).ok());
                let message = body
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| body.to_string());

                match code {
                    Some(status_code) => from_status(status_code, message, 5),
                    None => GmailError::BadRequest(message),
                }
            }
            google_gmail1::Error::MissingToken(ref err) => {
                GmailError::AuthError(format!("Missing access token: {}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}
