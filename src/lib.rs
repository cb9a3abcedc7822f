//! Telegram vote-collection bot.
//!
//! Inbound updates flow through a three-stage [`pipeline`]: the fetcher polls
//! the platform, the dispatcher applies commands and votes against the
//! [`store`], and the sender delivers responses.

pub mod classifier;
pub mod config;
pub mod ledger;
pub mod pipeline;
pub mod platform;
pub mod render;
pub mod store;
