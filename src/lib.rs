pub mod config;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod interaction;
pub mod layers;
pub mod pipeline;
pub mod scene;
pub mod server;
pub mod stats;
pub mod transform;
pub mod types;
