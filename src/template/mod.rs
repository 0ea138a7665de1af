//! Rewriting of dependent data specs from already-computed results.

mod interpolate;

pub use interpolate::{interpolate_spec, lookup_path, render_template};
