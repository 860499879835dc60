use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use common::{Outcome, Status};

/// Timestamp layout embedded in session names.
pub const SESSION_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Whether a session was opened by a full run or a canary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Standard,
    Canary,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Canary => "canary",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "canary" => Ok(Self::Canary),
            other => Err(format!("unknown session mode '{other}'")),
        }
    }
}

/// Build a session name from the owner's display name and a timestamp.
///
/// Two sessions for the same owner opened within the same second share a
/// name; lookups resolve to the newest one.
pub fn session_name(owner: &str, mode: SessionMode, at: DateTime<Utc>) -> String {
    let stamp = at.format(SESSION_TIME_FORMAT);
    match mode {
        SessionMode::Standard => format!("{owner}_{stamp}"),
        SessionMode::Canary => format!("{owner}_canary_{stamp}"),
    }
}

/// One named run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub mode: SessionMode,
    pub created_at: DateTime<Utc>,
}

/// One persisted per-target outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRow {
    pub id: i64,
    pub session_id: i64,
    pub owner_id: i64,
    pub target: String,
    pub status: Status,
    pub output: String,
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

impl LogRow {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_parts(
            self.target.clone(),
            self.status,
            self.output.clone(),
            self.error.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn standard_session_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            session_name("deploy", SessionMode::Standard, at),
            "deploy_2024-03-09_07:05:01"
        );
    }

    #[test]
    fn canary_session_name() {
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            session_name("site.yml", SessionMode::Canary, at),
            "site.yml_canary_2024-12-31_23:59:59"
        );
    }

    #[test]
    fn session_mode_round_trips_through_text() {
        for mode in [SessionMode::Standard, SessionMode::Canary] {
            assert_eq!(mode.as_str().parse::<SessionMode>().unwrap(), mode);
        }
        assert!("nightly".parse::<SessionMode>().is_err());
    }
}
