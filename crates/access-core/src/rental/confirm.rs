//! ============================================================================
//! Assignment Confirmation - Receipt polling for submitted delegations
//! ============================================================================
//! A submission is not a rental until the store reports it committed.
//! Running out of polls is a failure, never a success.
//! ============================================================================

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{AccessConfig, DEFAULT_CONFIRM_MAX_POLLS, DEFAULT_CONFIRM_POLL_MS};
use crate::reader::TokenStateReader;
use crate::store::{SubmissionId, SubmissionStatus};
use crate::types::AccessError;

/// How long to wait for an assignment to be included
#[derive(Debug, Clone)]
pub struct ConfirmConfig {
    /// Maximum number of status polls
    pub max_polls: u32,
    /// Delay before each poll
    pub poll_interval: Duration,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            max_polls: DEFAULT_CONFIRM_MAX_POLLS,
            poll_interval: Duration::from_millis(DEFAULT_CONFIRM_POLL_MS),
        }
    }
}

impl From<&AccessConfig> for ConfirmConfig {
    fn from(config: &AccessConfig) -> Self {
        Self {
            max_polls: config.confirm_max_polls,
            poll_interval: config.confirm_poll_interval(),
        }
    }
}

/// Poll until the submission commits or reverts.
/// Status-read errors are logged and polling continues.
pub async fn await_confirmation(
    reader: &TokenStateReader,
    id: &SubmissionId,
    config: &ConfirmConfig,
) -> Result<(), AccessError> {
    info!("Waiting for confirmation of {}", id);

    for attempt in 0..config.max_polls {
        sleep(config.poll_interval).await;

        let status = reader
            .timed("assignment status", reader.store().assignment_status(id))
            .await;

        match status {
            Ok(SubmissionStatus::Committed) => {
                info!("Assignment {} confirmed (poll {})", id, attempt + 1);
                return Ok(());
            }
            Ok(SubmissionStatus::Reverted(reason)) => {
                warn!("Assignment {} reverted: {}", id, reason);
                return Err(AccessError::AssignmentRejected(reason));
            }
            Ok(SubmissionStatus::Pending) => {
                debug!("Assignment {} pending (poll {})", id, attempt + 1);
            }
            Err(e) => {
                warn!("Error checking {} (poll {}): {}", id, attempt + 1, e);
            }
        }
    }

    warn!(
        "Confirmation polling timed out for {} after {} polls",
        id, config.max_polls
    );
    Err(AccessError::StoreUnavailable(format!(
        "assignment {} submitted but not confirmed after {} polls",
        id, config.max_polls
    )))
}
