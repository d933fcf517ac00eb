pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod link;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod tasks;
pub mod workspace;
