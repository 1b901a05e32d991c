pub mod counting_config;
pub mod error;
pub mod geometry_utils;
pub mod persistence;
pub mod pipeline;
pub mod sources;
pub mod systems;
pub mod tracking;

pub type Point2D = (f32, f32);

/// Opaque, stable identifier assigned to one physical object by the upstream tracker
pub type TrackId = u64;
