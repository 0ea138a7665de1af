//! Execution request shapes and entry validation.

mod schema;
mod validation;

pub use schema::{
    AuthType, Authorization, DataSpec, DataSpecMap, ExecutionRequest, HttpMethod, PassedVariable,
    RequestMode,
};
pub use validation::{is_valid_identifier, validate_request, RESERVED_NAMES};
