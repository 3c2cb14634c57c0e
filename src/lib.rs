#![forbid(unsafe_code)]

pub mod app;
pub mod browser;
pub mod catalog;
pub mod cli;
pub mod dispatch;
pub mod export;
pub mod extract;
pub mod formats;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod schedule;
pub mod scrape;
pub mod selectors;
pub mod stats;
pub mod store;
pub mod urls;
