//! Error types
use std::fmt;

use crate::api::ApiError;
use crate::transport::TransportError;

/// Top-level error for every operation in this crate.
///
/// The three layers matter to callers: [`Error::Config`] is raised locally
/// before any network traffic, [`Error::Transport`] means the engine could
/// not be reached, and [`Error::Api`] means the engine was reached and
/// rejected the request with a structured error. Recovery logic such as
/// create-on-not-found branches on the latter via
/// [`is_api_error_code`](Error::is_api_error_code).
#[derive(Debug)]
pub enum Error {
    Config(ConfigError),
    Transport(TransportError),
    Api(ApiError),
    Encoding(String),
    Decoding(String),
    /// a reply arrived without an error but also without the explicit
    /// success marker the operation requires
    UnexpectedResponse(String),
    /// the transport cannot issue synchronous-style requests, which pull
    /// retrieval depends on
    SyncRequestsUnsupported,
}

impl Error {
    /// The structured engine error, when this is one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this is a structured engine error with the given code, e.g.
    /// [`ERR_CONSUMER_NOT_FOUND`](crate::api::ERR_CONSUMER_NOT_FOUND).
    pub fn is_api_error_code(&self, err_code: u16) -> bool {
        matches!(self, Error::Api(e) if e.err_code == err_code)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Error::Api(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "configuration error: {}", e),
            Error::Transport(e) => write!(f, "transport error: {}", e),
            Error::Api(e) => write!(f, "{}", e),
            Error::Encoding(e) => write!(f, "error encoding request: {}", e),
            Error::Decoding(e) => write!(f, "error decoding response: {}", e),
            Error::UnexpectedResponse(e) => write!(f, "unexpected response: {}", e),
            Error::SyncRequestsUnsupported => write!(
                f,
                "the transport does not support synchronous requests; use an explicit-inbox pull \
                 request instead"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Api(e) => Some(e),
            _ => None,
        }
    }
}

/// Local configuration failures, raised before any request is sent.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidStreamName(String),
    InvalidConsumerName(String),
    /// the configuration never received a name and none could be generated
    MissingName,
    /// a max-deliver of exactly zero, which would deliver nothing
    PreventsDelivery,
    SamplePercentOutOfRange(i64),
    /// a non-zero pull expiry below the engine's 1ms floor
    RequestExpiresTooShort,
    EmptyBackoff,
    InvalidBackoff(String),
    EmptyMetadataKey,
    /// an update was attempted on an ephemeral consumer
    NotDurable,
    /// the aggregated reasons a full configuration failed validation
    Validation(Vec<String>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::InvalidStreamName(n) => write!(f, "{:?} is not a valid stream name", n),
            ConfigError::InvalidConsumerName(n) => {
                write!(f, "{:?} is not a valid consumer name", n)
            }
            ConfigError::MissingName => write!(f, "consumer configuration requires a name"),
            ConfigError::PreventsDelivery => {
                write!(f, "configuration would prevent all deliveries")
            }
            ConfigError::SamplePercentOutOfRange(p) => {
                write!(f, "sample percent {} must be 0-100", p)
            }
            ConfigError::RequestExpiresTooShort => {
                write!(f, "max request expires must be larger than 1ms")
            }
            ConfigError::EmptyBackoff => write!(f, "at least one backoff interval is required"),
            ConfigError::InvalidBackoff(e) => write!(f, "invalid backoff: {}", e),
            ConfigError::EmptyMetadataKey => write!(f, "invalid empty string key in metadata"),
            ConfigError::NotDurable => write!(f, "only durable consumers can be updated"),
            ConfigError::Validation(reasons) => {
                write!(f, "configuration validation failed: {}", reasons.join(", "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}
