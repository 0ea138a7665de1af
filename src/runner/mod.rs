//! Subprocess execution and the sentinel result protocol.

mod process;
mod protocol;

pub use process::{run_script, LineObserver, SubprocessOutput, SubprocessSpec};
pub use protocol::{
    extract_sentinel_payload, GlobalOutcome, RawFetchError, RawOutcome, RawResult,
    GLOBAL_EXEC_SENTINEL, SECURE_FETCH_SENTINEL,
};
