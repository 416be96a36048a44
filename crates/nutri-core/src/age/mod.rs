//! Age context domain module.
//!
//! - `model`: the validated [`AgeContext`] value
//! - `guard`: send/regenerate permission checks against the session age

mod guard;
mod model;

pub use guard::{AgeCheck, MismatchResolution, can_send, effective_age};
pub use model::{AgeContext, MAX_AGE, MIN_AGE};
