//! Submission tracking
//!
//! A [`Submission`] records every status the node reports for one atom. Each
//! call to [`Submission::updates`] starts from `SUBMITTING`, however late it is
//! made, and the history closes after the first terminal status.
//!
//! Negative terminal statuses are returned as errors and never retried here:
//! the inputs of a rejected atom may already be spent, so rebuilding is left to
//! the caller.

use crate::transport::AtomSubmitter;
use crate::{Error, Result};
use futures::StreamExt;
use radix_ledger_core::{Atom, AtomId};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Status of a submitted atom as reported by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionStatus {
    /// Handed to the submitter
    Submitting,
    /// Accepted by a node, awaiting storage
    Submitted,
    /// Stored in the ledger
    Stored,
    /// Rejected for an unspecified reason
    Failed,
    /// Spends a particle another atom already spent
    Collision,
    /// Malformed or badly signed
    ValidationError,
    /// Node is not in a state to accept the atom
    IllegalState,
    /// Peer cannot serve this atom
    UnsuitablePeer,
    /// Node reported something unrecognised
    UnknownError,
}

impl SubmissionStatus {
    /// Whether the status ends the submission
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitting | Self::Submitted)
    }

    /// Whether the atom made it into the ledger
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitting => "SUBMITTING",
            Self::Submitted => "SUBMITTED",
            Self::Stored => "STORED",
            Self::Failed => "FAILED",
            Self::Collision => "COLLISION",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::IllegalState => "ILLEGAL_STATE",
            Self::UnsuitablePeer => "UNSUITABLE_PEER",
            Self::UnknownError => "UNKNOWN_ERROR",
        };
        f.write_str(name)
    }
}

/// One status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionUpdate {
    /// Reported status
    pub status: SubmissionStatus,
    /// Optional detail from the node
    pub message: Option<String>,
}

impl SubmissionUpdate {
    /// Update without detail
    pub fn new(status: SubmissionStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }

    /// Update with detail
    pub fn with_message(status: SubmissionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }
}

/// Handle on one in-flight submission
#[derive(Debug, Clone)]
pub struct Submission {
    atom_id: AtomId,
    history: watch::Receiver<Vec<SubmissionUpdate>>,
}

impl Submission {
    /// Submit the atom and track its status in the background.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(atom: Atom, submitter: Arc<dyn AtomSubmitter>) -> Self {
        let atom_id = atom.id();
        let (tx, rx) = watch::channel(vec![SubmissionUpdate::new(SubmissionStatus::Submitting)]);

        info!(atom = %atom_id, "Submitting atom");
        tokio::spawn(track(atom_id, atom, submitter, tx));

        Self {
            atom_id,
            history: rx,
        }
    }

    /// Id of the submitted atom
    pub fn atom_id(&self) -> AtomId {
        self.atom_id
    }

    /// Most recent status
    pub fn status(&self) -> SubmissionStatus {
        self.history
            .borrow()
            .last()
            .map(|update| update.status)
            .unwrap_or(SubmissionStatus::Submitting)
    }

    /// Every update so far, then each new one as it arrives
    pub fn updates(&self) -> SubmissionUpdates {
        SubmissionUpdates {
            history: self.history.clone(),
            cursor: 0,
        }
    }

    /// Wait for the terminal status.
    ///
    /// Resolves to the atom id once stored; any other terminal status is an
    /// [`Error::Submission`].
    pub async fn outcome(&self) -> Result<AtomId> {
        let mut updates = self.updates();
        while let Some(update) = updates.next().await {
            if !update.status.is_terminal() {
                continue;
            }
            if update.status.is_stored() {
                return Ok(self.atom_id);
            }
            return Err(Error::Submission {
                atom: self.atom_id,
                status: update.status,
                message: update.message.unwrap_or_default(),
            });
        }
        Err(Error::Closed)
    }
}

/// Replaying cursor over a submission's status history
#[derive(Debug)]
pub struct SubmissionUpdates {
    history: watch::Receiver<Vec<SubmissionUpdate>>,
    cursor: usize,
}

impl SubmissionUpdates {
    /// Next update, or `None` after the terminal one
    pub async fn next(&mut self) -> Option<SubmissionUpdate> {
        loop {
            {
                let history = self.history.borrow_and_update();
                if let Some(update) = history.get(self.cursor) {
                    self.cursor += 1;
                    return Some(update.clone());
                }
                if history.last().is_some_and(|u| u.status.is_terminal()) {
                    return None;
                }
            }
            self.history.changed().await.ok()?;
        }
    }
}

async fn track(
    atom_id: AtomId,
    atom: Atom,
    submitter: Arc<dyn AtomSubmitter>,
    history: watch::Sender<Vec<SubmissionUpdate>>,
) {
    let record = |update: SubmissionUpdate| {
        debug!(atom = %atom_id, status = %update.status, "Submission update");
        history.send_modify(|updates| updates.push(update));
    };

    let mut statuses = match submitter.submit(atom).await {
        Ok(statuses) => statuses,
        Err(err) => {
            warn!(atom = %atom_id, error = %err, "Submission failed to start");
            record(SubmissionUpdate::with_message(
                SubmissionStatus::Failed,
                err.to_string(),
            ));
            return;
        }
    };

    while let Some(update) = statuses.next().await {
        // The initial SUBMITTING is already recorded
        if update.status == SubmissionStatus::Submitting {
            continue;
        }
        let terminal = update.status.is_terminal();
        let status = update.status;
        record(update);

        if terminal {
            if status.is_stored() {
                info!(atom = %atom_id, "Atom stored");
            } else {
                warn!(atom = %atom_id, status = %status, "Atom rejected");
            }
            return;
        }
    }

    warn!(atom = %atom_id, "Status stream ended before a terminal status");
    record(SubmissionUpdate::with_message(
        SubmissionStatus::UnknownError,
        "status stream ended before a terminal status",
    ));
}
