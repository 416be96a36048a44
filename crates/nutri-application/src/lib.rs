//! Application layer for the Nutri chat client.
//!
//! Holds the client-side conversation state and implements the optimistic
//! operations on it on top of a [`nutri_core::conversation::ChatService`].

pub mod in_flight;
pub mod pipeline;
pub mod revision;
mod state;
pub mod store;
mod sync;
pub mod temp_id;

#[cfg(test)]
mod test_support;

pub use in_flight::{InFlightGuard, InFlightRegistry};
pub use pipeline::{OptimisticPipeline, SubmitOutcome};
pub use revision::RevisionController;
pub use state::ConversationKey;
pub use store::{BulkOutcome, ConversationStore};
