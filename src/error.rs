use thiserror::Error;

/// Failures a measurer can report back to its caller.
///
/// The `Display` text is what ends up in the `error` field of a failure
/// response, so transport and decode messages are passed through verbatim.
#[derive(Error, Debug)]
pub enum MeasureError {
    /// The required `url` query parameter was absent or empty
    #[error("Missing url parameter")]
    MissingUrl,

    /// The target could not be turned into an absolute http(s) URI
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },

    /// Connection, DNS or protocol failure talking to the upstream
    #[error("{0}")]
    Transport(String),

    /// The upstream replied, but not with JSON
    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    /// A derived duration came out negative (clock or ordering defect)
    #[error("Negative duration for {name}: {value}ms (clock or ordering defect)")]
    NegativeDuration { name: &'static str, value: i64 },

    /// A measurer endpoint answered with `success: false`
    #[error("Measurer reported failure: {0}")]
    Reported(String),
}

impl MeasureError {
    pub fn invalid_target<S: Into<String>, R: ToString>(url: S, reason: R) -> Self {
        Self::InvalidTarget {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<hyper::Error> for MeasureError {
    fn from(error: hyper::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for MeasureError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidJson(error.to_string())
    }
}
