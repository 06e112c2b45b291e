/// Configuration management
use crate::error::{ChatError, Result};
use crate::types::{Role, UserId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chat gateway address (persistent event stream)
    pub server_addr: SocketAddr,

    /// Base URL of the marketplace REST API
    pub rest_base_url: String,

    /// Local authenticated user (supplied by the auth layer)
    pub local_user_id: UserId,

    /// Role of the local user (drives conversation-list visibility)
    pub local_role: Role,

    /// Connection timeout for a single connect attempt
    pub connect_timeout: Duration,

    /// Delay between reconnect attempts (a random jitter is added on top)
    pub retry_interval: Duration,

    /// Upper bound of the random reconnect jitter
    pub retry_jitter: Duration,

    /// REST fetch timeout
    pub fetch_timeout: Duration,

    /// Local inactivity window after which a typing burst ends
    pub typing_stop_after: Duration,

    /// How long a remote typing indicator survives without a refresh
    pub typing_expiry: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:7400".parse().unwrap(),
            rest_base_url: "http://127.0.0.1:7401".to_string(),
            local_user_id: 0,
            local_role: Role::User,
            connect_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_secs(3),
            retry_jitter: Duration::from_millis(750),
            fetch_timeout: Duration::from_secs(10),
            typing_stop_after: Duration::from_secs(2),
            // Sender debounce plus network slack
            typing_expiry: Duration::from_millis(2500),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(ChatError::Config(format!(
                "Usage: {} <user_id> [--server <addr>] [--rest <url>] [--role <user|corretor|admin>]",
                args.first().map(String::as_str).unwrap_or("chat")
            )));
        }

        let local_user_id = args[1]
            .parse::<UserId>()
            .map_err(|_| ChatError::Config("User id must be an integer".to_string()))?;

        let mut server_addr: Option<SocketAddr> = None;
        let mut rest_base_url: Option<String> = None;
        let mut local_role = Role::User;

        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--server" => {
                    let addr = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--server requires an address argument".to_string())
                    })?;
                    server_addr = Some(addr.parse().map_err(|_| {
                        ChatError::Config("--server must be a valid socket address".to_string())
                    })?);
                    i += 2;
                }
                "--rest" => {
                    let url = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--rest requires a URL argument".to_string())
                    })?;
                    rest_base_url = Some(url.trim_end_matches('/').to_string());
                    i += 2;
                }
                "--role" => {
                    let role = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--role requires a value".to_string())
                    })?;
                    local_role = match role.to_ascii_lowercase().as_str() {
                        "user" => Role::User,
                        "corretor" | "broker" => Role::Corretor,
                        "admin" => Role::Admin,
                        other => {
                            return Err(ChatError::Config(format!(
                                "Unknown role: {} (expected user, corretor or admin)",
                                other
                            )))
                        }
                    };
                    i += 2;
                }
                other => {
                    return Err(ChatError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Some(addr) = std::env::var("HOMELINK_CHAT_SERVER")
            .ok()
            .and_then(|s| s.parse::<SocketAddr>().ok())
        {
            server_addr = Some(addr);
        }
        if let Ok(url) = std::env::var("HOMELINK_REST_URL") {
            rest_base_url = Some(url.trim_end_matches('/').to_string());
        }

        let defaults = Config::default();
        Ok(Self {
            server_addr: server_addr.unwrap_or(defaults.server_addr),
            rest_base_url: rest_base_url.unwrap_or_else(|| defaults.rest_base_url.clone()),
            local_user_id,
            local_role,
            ..defaults
        })
    }
}
