//! Conversion of feed responses into engine events.
//!
//! This module provides the [`FeedSync`] struct, which fetches the current
//! feed snapshot through a [`FeedRequester`] and turns each entry into an
//! [`Event`].

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;

use crate::{
    error::EngineError,
    events::Event,
    feed::{
        requester::FeedRequester,
        response_structs::{EventResponse, GeometryResponse},
    },
    geo::Coordinates,
};

/// Fetches the feed and converts it into [`Event`]s.
///
/// # Examples
///
/// ```no_run
/// let requester = EonetRequester::new("https://eonet.gsfc.nasa.gov/api/v3/events", 20, Duration::from_secs(30));
/// let feed_sync = FeedSync::new(requester);
/// let events = feed_sync.fetch_events(Utc::now()).await?;
/// ```
pub struct FeedSync<R: FeedRequester> {
    /// Requester to interact with the feed
    feed_requester: R,
}

impl<R: FeedRequester> FeedSync<R> {
    pub fn new(feed_requester: R) -> Self {
        FeedSync { feed_requester }
    }

    /// Fetches the full current snapshot of the feed.
    ///
    /// # Arguments
    ///
    /// * `fetched_at` - Used as the observation time of events that carry no
    ///   dated geometry.
    ///
    /// # Errors
    ///
    /// [`EngineError::FeedUnavailable`] if the feed could not be fetched.
    pub async fn fetch_events(&self, fetched_at: DateTime<Utc>) -> Result<Vec<Event>, EngineError> {
        info!("request events from feed");
        let responses = self.feed_requester.get_events().await?;

        let events: Vec<Event> = responses
            .into_iter()
            .map(|response| self.convert_event(response, fetched_at))
            .collect();

        info!("finished requesting events from feed, {} events", events.len());
        Ok(events)
    }

    /// Converts a feed entry into an [`Event`].
    ///
    /// The most recent `Point` geometry gives the coordinates. The most recent
    /// geometry of any type gives the observation time.
    fn convert_event(&self, response: EventResponse, fetched_at: DateTime<Utc>) -> Event {
        debug!("convert event {}", response);

        let closed = response.is_closed();
        let observed_at = response
            .geometry
            .iter()
            .map(|geometry| geometry.date)
            .max()
            .unwrap_or(fetched_at);

        let coordinates = response
            .geometry
            .iter()
            .filter(|geometry| geometry.kind == "Point")
            .max_by_key(|geometry| geometry.date)
            .and_then(|geometry| self.convert_point(geometry));

        if coordinates.is_none() && !closed {
            warn!(
                "{}",
                EngineError::InvalidEventGeometry {
                    event_id: response.id.clone()
                }
            );
        }

        Event {
            id: response.id,
            title: response.title,
            category_title: response
                .categories
                .into_iter()
                .next()
                .map(|category| category.title)
                .unwrap_or_default(),
            coordinates,
            closed,
            observed_at,
        }
    }

    /// Reads `[longitude, latitude]` from a point geometry.
    ///
    /// Returns `None` for malformed or out-of-range coordinates.
    fn convert_point(&self, geometry: &GeometryResponse) -> Option<Coordinates> {
        let Value::Array(values) = &geometry.coordinates else {
            return None;
        };
        let [longitude, latitude] = values.as_slice() else {
            return None;
        };
        let longitude = longitude.as_f64()?;
        let latitude = latitude.as_f64()?;

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Coordinates::new(latitude, longitude))
    }
}
