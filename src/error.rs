use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config at {path}: {source}")]
    Unreadable { path: String, source: std::io::Error },
    #[error("config is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("bad config value: {0}")]
    Invalid(String),
}

/// Failures raised by the temporal parser. Inside `schedule_reminder` all
/// of these collapse to the localized exception string; the original error
/// only reaches the log.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload does not start with a recognized target")]
    UnrecognizedTarget,
    #[error("unable to find a temporal phrase in the payload")]
    UnableToFindWhen,
    #[error("unparseable time: {0}")]
    UnparseableTime(String),
    #[error("unparseable date: {0}")]
    UnparseableDate(String),
    #[error("unrecognized duration unit: {0}")]
    UnitNotRecognized(String),
    #[error("month not found in: {0}")]
    MonthNotFound(String),
    #[error("could not read a number from: {0}")]
    CouldNotFormatNumber(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat host request failed for {path}: {source}")]
    Http { path: String, source: reqwest::Error },
    #[error("chat host returned {status} for {path}")]
    Status { path: String, status: u16 },
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
}
