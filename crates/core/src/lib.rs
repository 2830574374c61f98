//! Atelier Floral Core - Domain types and business rules.
//!
//! This crate provides the domain model shared by every Atelier Floral component:
//! - `storefront` - Public shop, customer account, corporate and admin JSON API
//! - `cli` - Command-line tools for migrations, users and billing runs
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Every rule that decides whether an order or invoice
//! may change lives here so it can be tested without a running database.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, emails, money/VAT, statuses, pagination
//! - [`access`] - Identity union and the access-control rule table
//! - [`catalog`] - Products and search relevance scoring
//! - [`cart`] - Session cart aggregate
//! - [`order`] - Order aggregate and its status lifecycle
//! - [`invoice`] - Corporate invoice aggregate, totals and billing lifecycle
//! - [`delivery`] - Postal code validation and delivery zones
//! - [`closure`] - Shop closure settings and derived shop status

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod access;
pub mod cart;
pub mod catalog;
pub mod closure;
pub mod delivery;
pub mod invoice;
pub mod order;
pub mod types;

pub use types::*;
