//! Radius-based matching of subscribers against an event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;

use crate::{
    error::EngineError,
    events::Event,
    geo::distance_km,
    subscribers::{Subscriber, SubscriberRegistry},
};

/// A subscriber inside an event's geofence.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub subscriber: Subscriber,
    pub distance_km: f64,
}

/// Finds the subscribers within a given radius of an event.
///
/// The scan is linear in the number of active subscribers.
pub struct GeofenceMatcher {
    registry: Arc<SubscriberRegistry>,
}

impl GeofenceMatcher {
    /// Create a new [GeofenceMatcher] reading subscribers from `registry`.
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        GeofenceMatcher { registry }
    }

    /// Returns the active subscribers at most `radius_km` from `event`.
    ///
    /// The boundary is inclusive and NaN distances never match. Results are
    /// ordered by ascending distance, then subscriber id. Closed events match
    /// nobody.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidEventGeometry`] if the event has no coordinates
    /// - [`EngineError::RegistryUnavailable`] if the subscriber snapshot cannot
    ///   be used
    pub fn matches(
        &self,
        event: &Event,
        radius_km: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Match>, EngineError> {
        let Some(event_coordinates) = event.coordinates else {
            return Err(EngineError::InvalidEventGeometry {
                event_id: event.id.clone(),
            });
        };
        if event.closed {
            debug!("event {} is closed, no match", event.id);
            return Ok(Vec::new());
        }

        let subscribers = self.registry.active_subscribers(now)?;

        let mut matches: Vec<Match> = subscribers
            .iter()
            .filter_map(|subscriber| {
                let location = subscriber.location?;
                let distance = distance_km(location, event_coordinates);
                (!distance.is_nan() && distance <= radius_km).then(|| Match {
                    subscriber: subscriber.clone(),
                    distance_km: distance,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.subscriber.id.cmp(&b.subscriber.id))
        });

        debug!(
            "event {}: {} of {} subscribers within {} km",
            event.id,
            matches.len(),
            subscribers.len(),
            radius_km
        );

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinates;
    use chrono::Duration;

    fn create_test_subscriber(id: &str, latitude: f64, longitude: f64) -> Subscriber {
        Subscriber {
            id: id.to_string(),
            phone: Some("+15550001".to_string()),
            location: Some(Coordinates::new(latitude, longitude)),
            alerts_enabled: true,
        }
    }

    fn create_test_event(latitude: f64, longitude: f64) -> Event {
        Event {
            id: "e1".to_string(),
            title: "Wildfire".to_string(),
            category_title: "Wildfires".to_string(),
            coordinates: Some(Coordinates::new(latitude, longitude)),
            closed: false,
            observed_at: Utc::now(),
        }
    }

    fn matcher_with(subscribers: Vec<Subscriber>, now: DateTime<Utc>) -> GeofenceMatcher {
        let registry = Arc::new(SubscriberRegistry::new(Duration::minutes(30)));
        registry.replace(subscribers, now);
        GeofenceMatcher::new(registry)
    }

    #[test]
    fn test_nearby_subscriber_matches() {
        let now = Utc::now();
        let matcher = matcher_with(vec![create_test_subscriber("u1", 28.70, 77.10)], now);

        let matches = matcher.matches(&create_test_event(28.71, 77.11), 50.0, now).unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].subscriber.id, "u1");
        assert!(matches[0].distance_km < 2.0);
    }

    #[test]
    fn test_distant_subscriber_does_not_match() {
        let now = Utc::now();
        let matcher = matcher_with(vec![create_test_subscriber("u1", 0.0, 0.0)], now);

        let matches = matcher.matches(&create_test_event(45.0, 90.0), 500.0, now).unwrap();

        assert!(matches.is_empty());
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let now = Utc::now();
        let subscriber = create_test_subscriber("u1", 0.0, 0.0);
        let event = create_test_event(1.0, 0.0);
        let exact = distance_km(subscriber.location.unwrap(), event.coordinates.unwrap());
        let matcher = matcher_with(vec![subscriber], now);

        assert_eq!(matcher.matches(&event, exact, now).unwrap().len(), 1);
        assert!(matcher.matches(&event, exact - 1e-9, now).unwrap().is_empty());
    }

    #[test]
    fn test_matches_sorted_by_distance() {
        let now = Utc::now();
        let matcher = matcher_with(
            vec![
                create_test_subscriber("far", 29.00, 77.10),
                create_test_subscriber("near", 28.71, 77.11),
                create_test_subscriber("middle", 28.80, 77.10),
            ],
            now,
        );

        let ids: Vec<String> = matcher
            .matches(&create_test_event(28.71, 77.11), 100.0, now)
            .unwrap()
            .into_iter()
            .map(|m| m.subscriber.id)
            .collect();

        assert_eq!(ids, vec!["near", "middle", "far"]);
    }

    #[test]
    fn test_nan_location_never_matches() {
        let now = Utc::now();
        let matcher = matcher_with(vec![create_test_subscriber("u1", f64::NAN, 77.10)], now);

        let matches = matcher
            .matches(&create_test_event(28.71, 77.11), f64::INFINITY, now)
            .unwrap();

        assert!(matches.is_empty());
    }

    #[test]
    fn test_event_without_coordinates_is_invalid() {
        let now = Utc::now();
        let matcher = matcher_with(vec![create_test_subscriber("u1", 28.70, 77.10)], now);
        let mut event = create_test_event(0.0, 0.0);
        event.coordinates = None;

        assert_eq!(
            matcher.matches(&event, 50.0, now),
            Err(EngineError::InvalidEventGeometry {
                event_id: "e1".to_string()
            })
        );
    }

    #[test]
    fn test_closed_event_matches_nobody() {
        let now = Utc::now();
        let matcher = matcher_with(vec![create_test_subscriber("u1", 28.70, 77.10)], now);
        let mut event = create_test_event(28.71, 77.11);
        event.closed = true;

        assert!(matcher.matches(&event, 50.0, now).unwrap().is_empty());
    }

    #[test]
    fn test_unavailable_registry_is_reported() {
        let registry = Arc::new(SubscriberRegistry::new(Duration::minutes(30)));
        let matcher = GeofenceMatcher::new(registry);

        assert!(matches!(
            matcher.matches(&create_test_event(28.71, 77.11), 50.0, Utc::now()),
            Err(EngineError::RegistryUnavailable(_))
        ));
    }
}
