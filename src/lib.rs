#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod browser;
pub mod comments;
pub mod config;
pub mod control;
pub mod csrf;
pub mod engagement;
pub mod events;
pub mod fragment;
pub mod logging;
pub mod pagination;
pub mod search;
pub mod toast;
pub mod ui;

#[cfg(test)]
mod testing;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run_article, run_news, ArticleOptions, NewsOptions};
