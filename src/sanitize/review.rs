//! Interface to the optional secondary output review.
//!
//! The actual reviewer (a third-party language-model call) lives outside this
//! crate; the orchestrator invokes whatever implementation it is given,
//! best-effort, after the Global Phase completes. Failures never affect the
//! execution result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::runner::GlobalOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum ReviewVerdict {
    Unreviewed,
    Approved,
    Flagged { reason: String },
}

#[async_trait]
pub trait OutputReviewer: Send + Sync {
    async fn review(&self, outcome: &GlobalOutcome) -> ReviewVerdict;
}

/// Default reviewer: does nothing.
pub struct NoopReviewer;

#[async_trait]
impl OutputReviewer for NoopReviewer {
    async fn review(&self, _outcome: &GlobalOutcome) -> ReviewVerdict {
        ReviewVerdict::Unreviewed
    }
}
