//! External geographic collaborators - geocoding, bounding boxes, nearby amenities

pub mod amenities;
pub mod bbox;
pub mod geocode;

pub use bbox::{BoundingBox, Coordinates};
