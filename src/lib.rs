pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod models;
pub mod pipeline;
pub mod store;
