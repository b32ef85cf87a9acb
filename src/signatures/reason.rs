//! Signer reason text.
//!
//! Turns completion records from the audit log into the `/Reason` string,
//! e.g. `1. Jane Doe - 07/29/2025, 02:30 PM UTC || 2. John Roe - ...`.

use super::types::{CompletionEvent, SignerInfo, DEFAULT_REASON};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;

/// Separator between signer entries.
pub const SIGNER_SEPARATOR: &str = " || ";

/// Parse an IANA zone name, falling back to UTC with a warning.
pub fn display_timezone(name: Option<&str>) -> Tz {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => Tz::UTC,
        Some(name) => name.parse().unwrap_or_else(|_| {
            log::warn!("Unknown display timezone '{}', using UTC", name);
            Tz::UTC
        }),
    }
}

/// Render a timestamp the way en-US short form does:
/// `07/29/2025, 02:30 PM UTC`.
pub fn format_timestamp(time: DateTime<Utc>, tz: Tz) -> String {
    time.with_timezone(&tz)
        .format("%m/%d/%Y, %I:%M %p %Z")
        .to_string()
}

/// Format signers as `"<n>. <name> - <timestamp>"` joined with `" || "`.
///
/// An empty list yields `"Signed by Documenso"`.
pub fn format_signers(signers: &[SignerInfo], tz: Tz) -> String {
    if signers.is_empty() {
        return DEFAULT_REASON.to_string();
    }

    signers
        .iter()
        .enumerate()
        .map(|(i, signer)| format!("{}. {} - {}", i + 1, signer.name, format_timestamp(signer.signed_at, tz)))
        .collect::<Vec<_>>()
        .join(SIGNER_SEPARATOR)
}

/// Normalise audit-log records into signers.
///
/// Events are ordered by completion time (stable for ties). The name is the
/// recipient name, else the email; nameless events are dropped and only the
/// first completion per name is kept.
pub fn signers_from_events(mut events: Vec<CompletionEvent>) -> Vec<SignerInfo> {
    events.sort_by_key(|event| event.completed_at);

    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter_map(|event| {
            let name = [event.recipient_name, event.email]
                .into_iter()
                .flatten()
                .map(|s| s.trim().to_string())
                .find(|s| !s.is_empty())?;
            Some(SignerInfo {
                name,
                signed_at: event.completed_at,
            })
        })
        .filter(|signer| seen.insert(signer.name.clone()))
        .collect()
}
