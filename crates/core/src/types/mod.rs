//! Core types for the merch CRM.
//!
//! Type-safe wrappers and pure business rules for the domain.

pub mod contact;
pub mod email;
pub mod id;
pub mod money;
pub mod order;
pub mod status;

pub use contact::{HIDDEN_CONTACT, MIN_PHONE_DIGITS, full_name, non_empty, phone_digits};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::{format_money, percent_of, ratio_percent, round_money};
pub use order::{
    FIRST_ORDER_SEQUENCE, StockEffect, format_order_number, next_order_number,
    order_number_prefix,
};
pub use status::*;
