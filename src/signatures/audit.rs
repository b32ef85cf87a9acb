//! Audit-log collaborator.

use super::types::CompletionEvent;
use crate::error::Result;

/// Read-only access to recipient-completion records.
///
/// Implemented for closures so callers can wire in a database query without
/// a wrapper type:
///
/// ```
/// use pdf_signing::signatures::{AuditLog, CompletionEvent};
///
/// let log = |_document_id: i64| -> pdf_signing::Result<Vec<CompletionEvent>> { Ok(Vec::new()) };
/// assert!(log.recipient_completions(7).unwrap().is_empty());
/// ```
pub trait AuditLog {
    /// Completion events recorded for `document_id`, in any order.
    fn recipient_completions(&self, document_id: i64) -> Result<Vec<CompletionEvent>>;
}

impl<F> AuditLog for F
where
    F: Fn(i64) -> Result<Vec<CompletionEvent>>,
{
    fn recipient_completions(&self, document_id: i64) -> Result<Vec<CompletionEvent>> {
        self(document_id)
    }
}
