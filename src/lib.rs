pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod models;
pub mod observability;
pub mod view;
pub mod wire;
