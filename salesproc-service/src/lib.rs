pub mod config;
pub mod consumer;
pub mod handler;
pub mod http;
pub mod processor;
