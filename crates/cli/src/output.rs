//! Result printing. Text for people, JSON for scripts.

use std::fmt::Write as _;

use common::Outcome;
use executor::{CanaryReport, RunReport};
use ledger::{LogRow, Session};
use serde::Serialize;

use crate::args::OutputFormat;
use crate::error::Result;

pub fn run_report(report: &RunReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(report),
        OutputFormat::Text => {
            let mut out = String::new();
            for outcome in &report.outcomes {
                outcome_block(&mut out, outcome);
            }
            let failed = report.outcomes.iter().filter(|o| !o.is_success()).count();
            let _ = writeln!(
                out,
                "session: {} ({} succeeded, {} failed)",
                report.session.name,
                report.outcomes.len() - failed,
                failed
            );
            Ok(out)
        }
    }
}

/// Connectivity results, one block per host, then a tally.
pub fn check_report(outcomes: &[Outcome], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(outcomes),
        OutputFormat::Text => {
            let mut out = String::new();
            for outcome in outcomes {
                outcome_block(&mut out, outcome);
            }
            let reachable = outcomes.iter().filter(|o| o.is_success()).count();
            let _ = writeln!(
                out,
                "{} reachable, {} unreachable",
                reachable,
                outcomes.len() - reachable
            );
            Ok(out)
        }
    }
}

/// Outcomes that ran but were never recorded.
pub fn outcomes(outcomes: &[Outcome], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(outcomes),
        OutputFormat::Text => {
            let mut out = String::new();
            for outcome in outcomes {
                outcome_block(&mut out, outcome);
            }
            Ok(out)
        }
    }
}

pub fn canary_report(report: &CanaryReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(report),
        OutputFormat::Text => {
            let mut out = String::new();
            outcome_block(&mut out, &report.outcome);
            let _ = writeln!(out, "session: {}", report.session.name);
            let _ = writeln!(out, "canary: {}", report.chosen);
            let _ = writeln!(out, "remaining: {}", report.remaining.join(","));
            Ok(out)
        }
    }
}

pub fn sessions(sessions: &[Session], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(sessions),
        OutputFormat::Text => {
            let mut out = String::new();
            for session in sessions {
                let _ = writeln!(
                    out,
                    "{}\t{}\t{}",
                    session.name,
                    session.mode,
                    session.created_at.to_rfc3339()
                );
            }
            Ok(out)
        }
    }
}

pub fn logs(rows: &[LogRow], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(rows),
        OutputFormat::Text => {
            let mut out = String::new();
            for row in rows {
                outcome_block(&mut out, &row.outcome());
            }
            Ok(out)
        }
    }
}

fn json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

/// `== host [status] error` then the output, newline-terminated.
fn outcome_block(out: &mut String, outcome: &Outcome) {
    let _ = write!(out, "== {} [{}]", outcome.target(), outcome.status());
    if !outcome.error().is_empty() {
        let _ = write!(out, " {}", outcome.error());
    }
    out.push('\n');
    let body = outcome.output();
    if !body.is_empty() {
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
}
