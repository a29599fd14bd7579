pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod correlate;
pub mod db;
pub mod growth;
pub mod models;
pub mod monitor;
pub mod poller;
pub mod report;
pub mod resolver;
pub mod services;
