//! pocketbank - authenticated request, cache-consistency and realtime core
//! of the pocketbank mobile client.
//!
//! This library exposes modules for use in integration tests and by the
//! screens built on top of it.

pub mod adapters;
pub mod api;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod realtime;
pub mod session;
pub mod traits;

pub use client::BankClient;
