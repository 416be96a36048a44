pub mod auth;
pub mod conversation;
pub mod message;

use anyhow::{Result, bail};
use nutri_application::ConversationStore;
use nutri_core::age::{AgeCheck, MismatchResolution};

/// What every command works with.
pub struct Session {
    pub store: ConversationStore,
    /// How to resolve an age mismatch, if the user chose up front.
    pub resolution: Option<MismatchResolution>,
}

impl Session {
    /// Checks the age guard for the active conversation, resolving a
    /// mismatch with the chosen resolution.
    ///
    /// Forking is only offered where a new conversation makes sense.
    pub async fn ensure_can_send(&self, allow_fork: bool) -> Result<()> {
        match self.store.check_send().await? {
            AgeCheck::Allowed(_) => Ok(()),
            AgeCheck::MissingAge => {
                bail!("No age selected. Pass --age <1-19> or set default_age in config.toml")
            }
            AgeCheck::Mismatch { pinned, session } => match self.resolution {
                Some(MismatchResolution::Fork) if !allow_fork => {
                    bail!("--fork cannot be used here; use --revert-age to continue with age {pinned}")
                }
                Some(resolution) => {
                    self.store.resolve_age_mismatch(resolution).await?;
                    match resolution {
                        MismatchResolution::Fork => {
                            println!("Started a new conversation for age {session}.")
                        }
                        MismatchResolution::RevertSessionAge => {
                            println!("Continuing with age {pinned}.")
                        }
                    }
                    Ok(())
                }
                None => bail!(
                    "This conversation is for a {pinned}-year-old, but the session age is {session}.\n\
                     Re-run with --fork to start a new conversation, or --revert-age to continue with age {pinned}."
                ),
            },
        }
    }
}
