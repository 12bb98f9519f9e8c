//! Substack API client with database-backed newsletter monitoring.
//!
//! The [`client`] module wraps the unofficial Substack web API (newsletters,
//! posts, users, categories, cookie-based auth). The [`monitor`] module layers
//! a SQLite store on top to detect new posts across polling runs.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod monitor;

pub use client::{Auth, Category, NewsletterClient, PostClient, SortOrder, UserClient};
pub use config::Config;
pub use db::Repository;
pub use error::{AppError, Result};
pub use models::{MonitoringResult, Newsletter, NewsletterStats, Post};
pub use monitor::Monitor;
