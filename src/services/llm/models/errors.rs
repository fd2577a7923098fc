/// Errors raised by the provider clients.
///
/// Only failures that happen before any text reaches the caller leave the
/// client as an `Err`. Once a stream has started, `StreamIo` and `Api` are
/// turned into a closing apology fragment instead.
#[derive(Debug)]
pub enum ModelClientError {
    /// The request could not be built or sent for a reason other than reachability.
    Request(String),
    /// Connection refused, DNS failure or timeout before a response arrived.
    Unreachable(String),
    /// The provider answered the initiating request with a non-success status.
    ProviderRequest { status: u16, body: String },
    /// The body broke off or stalled after streaming began.
    StreamIo(String),
    /// The provider reported an error inside an otherwise successful body.
    Api(String),
    Serialization(String),
    Config(String),
}

impl std::fmt::Display for ModelClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelClientError::Request(s) => write!(f, "Request Error: {s}"),
            ModelClientError::Unreachable(s) => write!(f, "Provider unreachable: {s}"),
            ModelClientError::ProviderRequest { status, body } => {
                write!(f, "Provider request failed: {status} - {body}")
            }
            ModelClientError::StreamIo(s) => write!(f, "Stream I/O Error: {s}"),
            ModelClientError::Api(s) => write!(f, "API Error: {s}"),
            ModelClientError::Serialization(s) => write!(f, "Serialization Error: {s}"),
            ModelClientError::Config(s) => write!(f, "Config Error: {s}"),
        }
    }
}

impl std::error::Error for ModelClientError {}

impl From<reqwest::Error> for ModelClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ModelClientError::Unreachable(err.to_string())
        } else {
            ModelClientError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ModelClientError {
    fn from(err: serde_json::Error) -> Self {
        ModelClientError::Serialization(err.to_string())
    }
}
