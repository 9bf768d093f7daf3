//! SmartMark: a minimal bookmark manager client.
//!
//! Users sign in through an OAuth provider, then create, list and delete their
//! own bookmarks stored in a managed backend. The [`managers::view_controller`]
//! keeps an in-memory snapshot of the list in sync with the backend through
//! post-mutation reloads and a live change feed.
//!
//! This library crate exposes all modules for use by the binary and integration tests.

pub mod app;
pub mod database;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;
