//! Notion API layer: HTTP client, schema introspection, database queries,
//! property extraction, and block-to-markdown rendering.
//!
//! Wire types mirror the Notion JSON exactly; everything user-facing is
//! mapped into crate types. The client never logs query payloads or tokens.

pub mod blocks;
pub mod client;
pub mod properties;
pub mod query;
pub mod schema;
pub mod text;

pub use client::NotionClient;
pub use query::Page;
pub use schema::{DatabaseSchema, GroupProperty, GroupPropertyKind};
