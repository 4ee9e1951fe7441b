use std::sync::Arc;
use std::time::Duration;

use handl_core::domain::call::{CallId, CallResult, RemoteCallStatus};
use tracing::{debug, warn};

use crate::telephony::{CallPlacement, PlacementError};

/// Wait between status fetches for the active call.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Status fetches before a call is declared timed out (about five minutes).
pub const MAX_POLL_ATTEMPTS: u32 = 60;
pub const TIMEOUT_REASON: &str = "timeout";

#[derive(Clone, Debug, PartialEq)]
pub enum MonitorOutcome {
    Ended(CallResult),
    Failed { reason: String },
    TimedOut { attempts: u32 },
}

impl MonitorOutcome {
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Ended(_) => None,
            Self::Failed { reason } => Some(reason.clone()),
            Self::TimedOut { .. } => Some(TIMEOUT_REASON.to_string()),
        }
    }
}

/// Polls one accepted call until it ends, errors or runs out of attempts.
#[derive(Clone)]
pub struct CallMonitor {
    placement: Arc<dyn CallPlacement>,
}

impl CallMonitor {
    pub fn new(placement: Arc<dyn CallPlacement>) -> Self {
        Self { placement }
    }

    /// Every attempt waits one interval first. Transient fetch errors use up
    /// an attempt without ending the watch; explicit rejections end it.
    pub async fn watch<F>(&self, call_id: &CallId, mut on_status: F) -> MonitorOutcome
    where
        F: FnMut(RemoteCallStatus) + Send,
    {
        for attempt in 1..=MAX_POLL_ATTEMPTS {
            tokio::time::sleep(POLL_INTERVAL).await;

            match self.placement.status(call_id).await {
                Ok(report) if report.status.is_terminal() => {
                    debug!(
                        event_name = "monitor.poll.ended",
                        call_id = %call_id,
                        attempt,
                        "call reported terminal status"
                    );
                    return MonitorOutcome::Ended(report.into_result());
                }
                Ok(report) => on_status(report.status),
                Err(PlacementError::Rejected(reason)) => {
                    warn!(
                        event_name = "monitor.poll.rejected",
                        call_id = %call_id,
                        attempt,
                        reason = %reason,
                        "call status fetch returned an explicit error"
                    );
                    return MonitorOutcome::Failed { reason };
                }
                Err(PlacementError::Transport(error)) => {
                    warn!(
                        event_name = "monitor.poll.transient_error",
                        call_id = %call_id,
                        attempt,
                        error = %error,
                        "call status fetch failed; waiting for next attempt"
                    );
                }
            }
        }

        warn!(
            event_name = "monitor.poll.timeout",
            call_id = %call_id,
            attempts = MAX_POLL_ATTEMPTS,
            "call did not reach a terminal status"
        );
        MonitorOutcome::TimedOut { attempts: MAX_POLL_ATTEMPTS }
    }
}
