pub mod api;
pub mod config;
pub mod context;
pub mod data_models;
pub mod engine;
pub mod errors;
pub mod extractor;
pub mod fetcher;
pub mod prober;
pub mod transport;
