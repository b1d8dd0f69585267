// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Activity Sweeper
//!
//! Background task that keeps non-terminal activities moving when nobody is
//! calling the API.
//!
//! Every `interval` (default 30 s) the sweeper:
//! 1. Rejects activities that have waited in `needs_quorum` longer than the
//!    approval TTL.
//! 2. Re-evaluates `pending` activities whose evaluation was interrupted.
//! 3. Re-dispatches `approved` activities whose enclave call did not finish.
//!    Activities locked by another worker are skipped until the next sweep.
//!
//! Shutdown uses a `CancellationToken`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::ActivityEngine;

/// Default interval between sweeps.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Open activities untouched for this long are resumed.
const RESUME_AFTER: Duration = Duration::from_secs(60);

pub struct ActivitySweeper {
    engine: ActivityEngine,
    interval: Duration,
    resume_after: Duration,
}

impl ActivitySweeper {
    pub fn new(engine: ActivityEngine) -> Self {
        Self {
            engine,
            interval: DEFAULT_INTERVAL,
            resume_after: RESUME_AFTER,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_resume_after(mut self, resume_after: Duration) -> Self {
        self.resume_after = resume_after;
        self
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Activity sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Activity sweeper shutting down");
                return;
            }

            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Activity sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// One pass over open activities. Returns (expired, progressed).
    pub async fn sweep(&self) -> (usize, usize) {
        let expired = match self.engine.expire_stale() {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Sweeper: failed to expire stale activities");
                0
            }
        };
        let progressed = match self.engine.resume_open(self.resume_after).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Sweeper: failed to resume open activities");
                0
            }
        };
        if expired > 0 || progressed > 0 {
            info!(expired, progressed, "Sweeper: pass complete");
        }
        (expired, progressed)
    }
}
