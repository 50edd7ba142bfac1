//! Geographic primitives.
//!
//! - [`Coordinates`]: a latitude/longitude pair in degrees
//! - [`distance_km`]: great-circle distance between two coordinates

mod distance;

pub use crate::geo::distance::{Coordinates, distance_km};
