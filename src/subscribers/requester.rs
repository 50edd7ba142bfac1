//! HTTP client for the account system's subscriber query.

use std::time::Duration;

use log::{debug, info};
use mockall::automock;
use reqwest::Client;

use crate::{error::EngineError, subscribers::Subscriber};

/// Source of the current subscriber set.
///
/// The result is assumed to be eventually consistent with the account system.
#[automock]
pub trait SubscriberRequester {
    /// Fetches every known subscriber, enabled or not.
    async fn get_subscribers(&self) -> Result<Vec<Subscriber>, EngineError>;
}

/// Requests subscribers from an HTTP endpoint returning a JSON array.
pub struct RegistryRequester {
    /// Subscriber query endpoint
    url: String,
    /// HTTP client
    client: Client,
    timeout: Duration,
}

impl RegistryRequester {
    /// Create a new [RegistryRequester].
    pub fn new(url: &str, timeout: Duration) -> Self {
        RegistryRequester {
            url: url.to_string(),
            client: Client::new(),
            timeout,
        }
    }
}

impl SubscriberRequester for RegistryRequester {
    /// Request `GET {url}`, expecting:
    /// ```text
    /// [
    ///   { "id": "u1", "phone": "+15550001", "location": {"latitude": 1.0, "longitude": 2.0}, "alertsEnabled": true },
    ///   { "id": "u2", "alertsEnabled": false }
    /// ]
    /// ```
    async fn get_subscribers(&self) -> Result<Vec<Subscriber>, EngineError> {
        info!("request subscribers");
        debug!("request {}", &self.url);

        let subscribers: Vec<Subscriber> = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| EngineError::RegistryUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| EngineError::RegistryUnavailable(e.to_string()))?;

        debug!("received {} subscribers from {}", subscribers.len(), &self.url);

        Ok(subscribers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_subscribers() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"[
            {"id": "u1", "phone": "+15550001", "location": {"latitude": 1.0, "longitude": 2.0}, "alertsEnabled": true},
            {"id": "u2", "alertsEnabled": false}
        ]"#;

        server
            .mock("GET", "/subscribers")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let requester = RegistryRequester::new(
            &format!("{}/subscribers", server.url()),
            Duration::from_secs(5),
        );
        let subscribers = requester.get_subscribers().await.unwrap();

        assert_eq!(subscribers.len(), 2);
        assert_eq!(subscribers[0].phone.as_deref(), Some("+15550001"));
        assert!(subscribers[0].is_active());
        assert!(!subscribers[1].is_active());
    }

    #[tokio::test]
    async fn test_get_subscribers_server_error() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/subscribers")
            .with_status(503)
            .create_async()
            .await;

        let requester = RegistryRequester::new(
            &format!("{}/subscribers", server.url()),
            Duration::from_secs(5),
        );
        let result = requester.get_subscribers().await;

        assert!(matches!(result, Err(EngineError::RegistryUnavailable(_))));
    }
}
