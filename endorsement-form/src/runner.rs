//! SubmissionRunner: loads a form session, validates it, hands the expanded
//! records to the sink and saves the session back.
//!
//! Validation failures return before the sink is called. Sink failures are
//! returned as-is and never retried: a multi-record append that fails partway
//! may already have written some rows, so the session stays editable and the
//! decision to submit again is left to the user.
//!
//! Every write to a session, edits included, goes through the runner and runs
//! under that session's lock. A session being submitted is marked in flight:
//! a second submit or an edit arriving meanwhile is refused with
//! [`SubmitError::InProgress`] instead of waiting on the sink.

use dashmap::DashSet;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    error::{FormError, Result, SubmitError},
    form::FormState,
    record::Record,
    session::{FormSession, SessionLocks, SessionStorage},
    sink::RecordSink,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub session_id: String,
    pub sink: String,
    pub records_written: usize,
}

/// Validate `state` and append its records to `sink`.
pub async fn submit_form(state: &FormState, sink: &dyn RecordSink) -> Result<Vec<Record>> {
    let records = state.validate()?;
    sink.append(&records).await?;
    Ok(records)
}

/// Clears a session's in-flight mark when the submission ends, however it ends.
struct InFlight<'a> {
    ids: &'a DashSet<String>,
    id: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ids.remove(self.id);
    }
}

/// Helper that runs the load → validate → append → save sequence for one session.
#[derive(Clone)]
pub struct SubmissionRunner {
    storage: Arc<dyn SessionStorage>,
    sink: Arc<dyn RecordSink>,
    locks: SessionLocks,
    in_flight: Arc<DashSet<String>>,
}

impl SubmissionRunner {
    pub fn new(storage: Arc<dyn SessionStorage>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            storage,
            sink,
            locks: SessionLocks::new(),
            in_flight: Arc::new(DashSet::new()),
        }
    }

    pub fn sink(&self) -> &Arc<dyn RecordSink> {
        &self.sink
    }

    pub fn is_submitting(&self, session_id: &str) -> bool {
        self.in_flight.contains(session_id)
    }

    /// Apply `edit` to a session that is neither submitted nor being submitted,
    /// and save it. Returns the saved session.
    pub async fn edit<F>(&self, session_id: &str, edit: F) -> Result<FormSession>
    where
        F: FnOnce(&mut FormState) -> Result<(), FormError>,
    {
        if self.is_submitting(session_id) {
            return Err(SubmitError::InProgress(session_id.to_string()));
        }
        let _guard = self.locks.lock(session_id).await;

        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| SubmitError::SessionNotFound(session_id.to_string()))?;
        if session.submitted {
            return Err(SubmitError::AlreadySubmitted(session_id.to_string()));
        }

        edit(&mut session.state)?;
        self.storage.save(session.clone()).await?;
        Ok(session)
    }

    pub async fn submit(&self, session_id: &str) -> Result<SubmissionReceipt> {
        if !self.in_flight.insert(session_id.to_string()) {
            warn!(session_id = %session_id, "Rejecting concurrent submission");
            return Err(SubmitError::InProgress(session_id.to_string()));
        }
        let _in_flight = InFlight {
            ids: &self.in_flight,
            id: session_id,
        };
        let _guard = self.locks.lock(session_id).await;

        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| SubmitError::SessionNotFound(session_id.to_string()))?;

        if session.submitted {
            warn!(session_id = %session_id, "Rejecting repeated submission");
            return Err(SubmitError::AlreadySubmitted(session_id.to_string()));
        }

        match submit_form(&session.state, self.sink.as_ref()).await {
            Ok(records) => {
                session.submitted = true;
                session.status_message = Some(format!(
                    "Form submitted successfully: {} record(s) written to {}",
                    records.len(),
                    self.sink.name()
                ));
                self.storage.save(session).await?;

                info!(
                    session_id = %session_id,
                    sink = %self.sink.name(),
                    records = records.len(),
                    "Form submitted"
                );
                Ok(SubmissionReceipt {
                    session_id: session_id.to_string(),
                    sink: self.sink.name().to_string(),
                    records_written: records.len(),
                })
            }
            Err(SubmitError::Validation(e)) => {
                info!(session_id = %session_id, reason = e.kind(), "Submission rejected by validation");
                Err(e.into())
            }
            Err(e) => {
                error!(
                    session_id = %session_id,
                    sink = %self.sink.name(),
                    kind = e.kind(),
                    error = %e,
                    "Sink append failed"
                );
                session.status_message = Some(format!("An error occurred: {e}"));
                self.storage.save(session).await?;
                Err(e)
            }
        }
    }
}
