pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod groupme;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod sink;
