//! Terminal output helpers
//!
//! Styled with `console`, with a plain fallback when stdout is not a
//! terminal (pipes, CI, tests).

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{step_error, step_error_detail, step_info, step_ok, step_warn_hint};
pub use progress::TaskSpinner;
