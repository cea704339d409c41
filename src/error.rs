// =============================================================================
// error.rs — THE TAXONOMY OF NOT FINDING YOUR CONTAINER
// =============================================================================
//
// Four flavours of bad news, from least to most visible:
//
//   adapter failure  -> one source broke; becomes an `error` progress event
//   no-result        -> one source had nothing; not an error at all
//   value failure    -> every source, both tiers, every retry came up empty
//   batch failure    -> the roll-up of value failures after a batch settles
//
// Only the last two ever reach a user.
// =============================================================================

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Something went wrong inside a single carrier adapter. Never escapes the
/// orchestrator.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("carrier responded with HTTP {status}")]
    Status { status: u16 },

    #[error("could not decode carrier response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no answer after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("{0}")]
    Other(String),
}

/// Why a value ended up with no result after all attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// At least one adapter blew up on the last attempt; this is the first one.
    AdapterFailed { adapter: String, message: String },
    /// Everyone answered, nobody had it.
    NotFound,
}

/// The per-value message a user actually sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValueFailure {
    pub value: String,
    pub reason: FailureReason,
}

impl fmt::Display for ValueFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FailureReason::AdapterFailed { adapter, message } => {
                write!(f, "{}: {} failed: {}", self.value, adapter, message)
            }
            FailureReason::NotFound => {
                write!(f, "{}: no carrier returned tracking information", self.value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("adapter definition `{0}` needs id|name|url-template[|tier]")]
    MalformedAdapter(String),

    #[error("adapter `{id}` url template has no {{value}} placeholder")]
    MissingPlaceholder { id: String },

    #[error("adapter `{id}` has unknown tier `{tier}` (expected primary or deferred)")]
    UnknownTier { id: String, tier: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_failure_messages() {
        let failed = ValueFailure {
            value: "ABCU1234567".into(),
            reason: FailureReason::AdapterFailed {
                adapter: "Maersk".into(),
                message: "carrier responded with HTTP 503".into(),
            },
        };
        assert_eq!(
            failed.to_string(),
            "ABCU1234567: Maersk failed: carrier responded with HTTP 503"
        );

        let missing = ValueFailure {
            value: "X1".into(),
            reason: FailureReason::NotFound,
        };
        assert_eq!(missing.to_string(), "X1: no carrier returned tracking information");
    }

    #[test]
    fn test_timeout_message() {
        let err = AdapterError::Timeout {
            after: Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "no answer after 90s");
    }
}
