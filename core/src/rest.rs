/// Marketplace REST collaborator: consumed, never implemented here. The
/// engine only needs two snapshot fetches; tests substitute an in-memory
/// implementation.
use crate::error::{ChatError, Result};
use crate::types::{ChatMessage, Contact, UserId};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Conversation snapshot for a user: contact-with-preview list
    async fn fetch_conversations(&self, user_id: UserId) -> Result<Vec<Contact>>;

    /// Durable message history between two users
    async fn fetch_history(&self, user_a: UserId, user_b: UserId) -> Result<Vec<ChatMessage>>;
}

/// Production implementation over the marketplace HTTP API
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Fetch(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::Fetch(format!("GET {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ChatError::Fetch(format!(
                "GET {}: HTTP {}",
                url,
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ChatError::Fetch(format!("Decode {}: {}", url, e)))
    }
}

#[async_trait]
impl MarketplaceApi for HttpApi {
    async fn fetch_conversations(&self, user_id: UserId) -> Result<Vec<Contact>> {
        self.get_json(format!("{}/chat/conversations/{}", self.base_url, user_id))
            .await
    }

    async fn fetch_history(&self, user_a: UserId, user_b: UserId) -> Result<Vec<ChatMessage>> {
        self.get_json(format!(
            "{}/chat/messages/{}/{}",
            self.base_url, user_a, user_b
        ))
        .await
    }
}
