use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nutri_application::ConversationStore;
use nutri_core::age::{AgeContext, MismatchResolution};
use nutri_infrastructure::{
    ConfigService, FileCredentialStore, HttpChatService, NutriPaths, init_logging,
};
use std::sync::Arc;

mod commands;
mod render;

use commands::Session;

#[derive(Parser)]
#[command(name = "nutri")]
#[command(about = "Nutri - nutrition advice chat for parents", long_about = None)]
struct Cli {
    /// Child's age in years (1-19) for this session
    #[arg(long, global = true)]
    age: Option<u8>,

    /// On an age mismatch, start a new conversation with the session age
    #[arg(long, global = true, conflicts_with = "revert_age")]
    fork: bool,

    /// On an age mismatch, continue with the conversation's age
    #[arg(long, global = true)]
    revert_age: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List conversations
    List {
        /// Include archived conversations
        #[arg(long)]
        archived: bool,
    },
    /// Show a conversation transcript
    Show { id: String },
    /// Send a message; starts a new conversation unless --conversation is given
    Send {
        #[arg(long, short)]
        conversation: Option<String>,
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Edit a user message and drop everything after it
    Edit {
        conversation: String,
        message_id: String,
        #[arg(required = true, num_args = 1..)]
        content: Vec<String>,
    },
    /// Generate a new answer for a bot message
    Regenerate {
        conversation: String,
        message_id: String,
    },
    /// Select another version of a message (1-indexed)
    SwitchVersion {
        conversation: String,
        message_id: String,
        version: usize,
    },
    /// Delete a message and everything after it
    Truncate {
        conversation: String,
        message_id: String,
    },
    /// Rename a conversation
    Rename {
        id: String,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Archive one or more conversations
    Archive {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Restore an archived conversation
    Unarchive { id: String },
    /// Delete one or more conversations
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Store credentials for the chat backend
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        user_id: String,
    },
    /// Remove stored credentials
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = NutriPaths::default();
    let config = ConfigService::with_paths(paths.clone())
        .get_config()
        .context("Failed to load configuration")?;
    let _log_guard = init_logging(&config, &paths)?;

    let credentials = Arc::new(FileCredentialStore::new(&paths)?);

    match cli.command {
        Commands::Login { token, user_id } => {
            return commands::auth::login(&credentials, token, user_id).await;
        }
        Commands::Logout => return commands::auth::logout(&credentials).await,
        _ => {}
    }

    tracing::debug!("[nutri] Using chat API at {}", config.api_base_url);
    let service = Arc::new(HttpChatService::new(&config, credentials)?);
    let store = ConversationStore::new(service);

    let age = match cli.age {
        Some(years) => Some(AgeContext::new(years)?),
        None => config.default_age()?,
    };
    store.set_session_age(age).await;

    let resolution = if cli.fork {
        Some(MismatchResolution::Fork)
    } else if cli.revert_age {
        Some(MismatchResolution::RevertSessionAge)
    } else {
        None
    };
    let session = Session { store, resolution };

    let result = match cli.command {
        Commands::List { archived } => commands::conversation::list(&session, archived).await,
        Commands::Show { id } => commands::conversation::show(&session, &id).await,
        Commands::Send {
            conversation,
            message,
        } => commands::message::send(&session, conversation.as_deref(), &message.join(" ")).await,
        Commands::Edit {
            conversation,
            message_id,
            content,
        } => commands::message::edit(&session, &conversation, &message_id, &content.join(" ")).await,
        Commands::Regenerate {
            conversation,
            message_id,
        } => commands::message::regenerate(&session, &conversation, &message_id).await,
        Commands::SwitchVersion {
            conversation,
            message_id,
            version,
        } => commands::message::switch_version(&session, &conversation, &message_id, version).await,
        Commands::Truncate {
            conversation,
            message_id,
        } => commands::message::truncate(&session, &conversation, &message_id).await,
        Commands::Rename { id, title } => {
            commands::conversation::rename(&session, &id, &title.join(" ")).await
        }
        Commands::Archive { ids } => commands::conversation::archive(&session, &ids).await,
        Commands::Unarchive { id } => commands::conversation::unarchive(&session, &id).await,
        Commands::Delete { ids } => commands::conversation::delete(&session, &ids).await,
        Commands::Login { .. } | Commands::Logout => Ok(()),
    };

    // Let detached work such as title persistence finish before exiting.
    session.store.flush().await;
    result
}
