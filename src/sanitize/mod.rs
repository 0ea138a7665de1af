//! Reduction of raw fetch outcomes to the credential-free projection that may
//! cross the phase boundary, plus the secondary-review seam.

mod result;
mod review;

pub use result::{sanitize_outcome, SanitizedResult};
pub use review::{NoopReviewer, OutputReviewer, ReviewVerdict};
