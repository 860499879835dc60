use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::Error;

/// Error text used when a failure is reported without any message.
const UNKNOWN_FAILURE: &str = "unknown error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}

/// The result of running one payload against one target.
///
/// Constructed only through [`Outcome::success`] and [`Outcome::failed`], so a
/// successful outcome never carries error text and a failed one always does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    target: String,
    status: Status,
    output: String,
    error: String,
}

impl Outcome {
    pub fn success(target: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            status: Status::Success,
            output: output.into(),
            error: String::new(),
        }
    }

    /// A failed outcome. `output` holds whatever was captured before the failure.
    pub fn failed(
        target: impl Into<String>,
        output: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = UNKNOWN_FAILURE.to_string();
        }
        Self {
            target: target.into(),
            status: Status::Failed,
            output: output.into(),
            error,
        }
    }

    /// Rebuild an outcome from stored fields, re-applying the status invariant.
    pub fn from_parts(target: String, status: Status, output: String, error: String) -> Self {
        match status {
            Status::Success => Self::success(target, output),
            Status::Failed => Self::failed(target, output, error),
        }
    }

    /// Same outcome attributed to a different target.
    pub fn retarget(&self, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..self.clone()
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn error(&self) -> &str {
        &self.error
    }
}
