/// HomeLink Chat - Marketplace Chat Synchronization Engine
///
/// Client-side engine keeping conversation list, message history, presence,
/// typing indicators and unread counters consistent across a reconnecting
/// event stream and a racing REST snapshot path.

pub mod client;
pub mod config;
pub mod contacts;
pub mod error;
pub mod history;
pub mod message_store;
pub mod net;
pub mod presence;
pub mod rest;
pub mod typing;
pub mod types;
pub mod unread;
pub mod utils;

pub use client::{ChatClient, ChatUpdate};
pub use config::Config;
pub use error::{ChatError, Result};
pub use history::HistoryState;
pub use net::{ClientEvent, ServerEvent, Session, SessionState};
pub use rest::{HttpApi, MarketplaceApi};
pub use types::{ChatMessage, Contact, Role, UserId};
