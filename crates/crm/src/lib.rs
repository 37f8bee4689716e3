//! Merch production CRM library.
//!
//! The server binary and the CLI share this crate: configuration, the
//! repositories, the domain services and the HTTP routes.
//!
//! # Layout
//!
//! - [`db`]: `sqlx` repositories, one per table family
//! - [`services`]: workflows spanning several tables (orders, stock,
//!   production, promocodes, notifications, storage)
//! - [`routes`]: axum handlers and Askama page templates
//! - [`middleware`]: sessions, auth extractors and request plumbing

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
