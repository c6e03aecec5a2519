//! Shopify Admin API adapter for the discount gateway.

pub mod admin;

pub use admin::AdminClient;
