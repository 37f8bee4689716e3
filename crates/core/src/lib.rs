//! Merch CRM Core - Shared types library.
//!
//! This crate provides the domain types used across the CRM workspace:
//! - `crm` - The web application (HTML pages, form actions, JSON endpoints)
//! - `cli` - Command-line tools for migrations, staff accounts and demo data
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP. The optional `postgres` feature adds `sqlx` encoding for
//! IDs, emails and enums.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, emails, money helpers, status enums and the order lifecycle

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
