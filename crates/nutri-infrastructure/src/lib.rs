//! Infrastructure layer for the Nutri chat client.
//!
//! Concrete implementations of the `nutri-core` boundaries: the HTTP chat
//! service, file-backed configuration and credentials, and logging setup.

pub mod config_service;
pub mod credential_store;
pub mod dto;
pub mod http_chat_service;
pub mod logging;
pub mod paths;

pub use config_service::ConfigService;
pub use credential_store::FileCredentialStore;
pub use http_chat_service::HttpChatService;
pub use logging::init_logging;
pub use paths::{NutriPaths, PathError, ServiceType};
