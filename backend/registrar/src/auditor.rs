//! Long-running background task that periodically audits roster, waitlist
//! and ledger consistency and logs anything it finds.

use std::time::Duration;

use enrollment_engine::EnrollmentEngine;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run the audit every `interval` until `shutdown` fires.
pub async fn run(engine: EnrollmentEngine, interval: Duration, shutdown: CancellationToken) {
    info!("Auditor starting — interval: {}s", interval.as_secs());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Auditor stopping");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        if let Err(e) = audit_once(&engine).await {
            error!("Audit error: {e}");
        }
    }
}

/// Perform a single audit pass. Returns the number of violations found.
pub async fn audit_once(engine: &EnrollmentEngine) -> enrollment_engine::Result<usize> {
    let violations = engine.audit().await?;
    if violations.is_empty() {
        info!("Audit clean");
    } else {
        for v in &violations {
            warn!(violation = ?v, "consistency violation");
        }
    }
    Ok(violations.len())
}
