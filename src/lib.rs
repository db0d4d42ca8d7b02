#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

pub mod app;
pub mod cluster;
pub mod collector;
pub mod config;
mod database;
pub mod embed;
pub mod engine;
pub mod error;
pub mod event;
pub mod normalizer;
pub mod notify;
pub mod query;
pub mod scheduler;
pub mod shutdown;
pub mod store;

use log::error;

/// Logs `err` and every error in its source chain.
pub fn log_error(err: &(dyn std::error::Error + 'static)) {
    error!("{}", err);
    let mut cause = err.source();
    while let Some(e) = cause {
        error!("\tcaused by: {}", e);
        cause = e.source();
    }
}
