//! # Session Driver
//!
//! Feeds transport events from one channel into a [`PrinterSession`] until
//! the job completes or fails. The channel serializes every event, so the
//! session needs no locking.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{BitmapProvider, PrinterSession, SessionNotice};
use crate::error::SessionError;
use crate::transport::{PeripheralId, Transport, TransportEvent};

/// Outcome of a successful job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrintReport {
    /// Bytes written to the printer, init sequence included
    pub bytes: usize,
    /// Write-without-response packets sent
    pub chunks: usize,
    /// Non-fatal provider warnings, in order
    pub warnings: Vec<String>,
}

/// Drive an already started session to its terminal notice.
///
/// If the event channel closes first, the session is reset and the job
/// fails with [`SessionError::ConnectionLost`].
pub async fn run<T: Transport>(
    session: &mut PrinterSession<T>,
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
) -> Result<PrintReport, SessionError> {
    let mut warnings = Vec::new();

    if session.is_idle() {
        return Err(SessionError::UnknownError("No print job running".to_string()));
    }

    while let Some(event) = events.recv().await {
        for notice in session.handle_event(event) {
            match notice {
                SessionNotice::Warning(warning) => warnings.push(warning),
                SessionNotice::Failed(error) => return Err(error),
                SessionNotice::Completed { bytes, chunks } => {
                    debug!("Print job completed");
                    return Ok(PrintReport {
                        bytes,
                        chunks,
                        warnings,
                    });
                }
            }
        }
    }

    warn!("Transport event channel closed mid-job");
    session.reset();
    Err(SessionError::ConnectionLost)
}

/// Start a job on `session` and wait for it to finish.
pub async fn print_and_wait<T: Transport>(
    session: &mut PrinterSession<T>,
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    address: PeripheralId,
    provider: BitmapProvider,
) -> Result<PrintReport, SessionError> {
    session.print_image(address, provider)?;
    run(session, events).await
}
