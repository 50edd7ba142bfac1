//! HTTP client for the hazard event feed.
//!
//! This module provides the [`FeedRequester`] trait and its HTTP
//! implementation [`EonetRequester`].

use std::time::Duration;

use log::{debug, info};
use mockall::automock;
use reqwest::Client;

use crate::{
    error::EngineError,
    feed::response_structs::{EventResponse, EventsResponse},
};

/// Trait for fetching the full current snapshot of the feed.
///
/// Implementations must be idempotent: the poll driver calls them once per
/// cycle and simply retries on the next one.
#[automock]
pub trait FeedRequester {
    async fn get_events(&self) -> Result<Vec<EventResponse>, EngineError>;
}

/// Requests events from an EONET-compatible feed.
///
/// # Examples
///
/// ```no_run
/// let requester = EonetRequester::new("https://eonet.gsfc.nasa.gov/api/v3/events", 20, Duration::from_secs(30));
/// let events = requester.get_events().await?;
/// ```
pub struct EonetRequester {
    /// Feed endpoint
    url: String,
    /// Number of days of history requested
    days: u32,
    /// HTTP client
    client: Client,
    timeout: Duration,
}

impl EonetRequester {
    /// Create a new [EonetRequester].
    ///
    /// # Arguments
    ///
    /// * `url` - The events endpoint of the feed.
    /// * `days` - Look-back window passed as the `days` query parameter.
    /// * `timeout` - Upper bound for the whole request.
    pub fn new(url: &str, days: u32, timeout: Duration) -> Self {
        EonetRequester {
            url: url.to_string(),
            days,
            client: Client::new(),
            timeout,
        }
    }
}

impl FeedRequester for EonetRequester {
    /// Request `{url}?days={days}` to get the current events.
    ///
    /// This api call returns a json envelope:
    /// ```text
    /// { "events": [
    ///   { "id": "EONET_1", "title": "...", "categories": [{"title": "Wildfires"}],
    ///     "geometry": [{"date": "...", "type": "Point", "coordinates": [lon, lat]}],
    ///     "closed": null }
    /// ] }
    /// ```
    async fn get_events(&self) -> Result<Vec<EventResponse>, EngineError> {
        info!("request events");
        debug!("request {}?days={}", &self.url, self.days);

        let response: EventsResponse = self
            .client
            .get(&self.url)
            .query(&[("days", self.days)])
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| EngineError::FeedUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| EngineError::FeedUnavailable(e.to_string()))?;

        debug!("response from {} -> {} events", &self.url, response.events.len());

        Ok(response.events)
    }
}
