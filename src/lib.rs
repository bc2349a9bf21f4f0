//! contextframe-mcp: MCP server for a columnar document dataset.
//!
//! Exposes a content-addressed document store to LLM-driven agents as a
//! uniform catalog of tools, resources, and monitoring streams over
//! JSON-RPC 2.0 (stdio or HTTP).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              MCP Server (rmcp)              │
//! │      JSON-RPC over stdio / HTTP stream      │
//! └─────────────────┬───────────────────────────┘
//!                   │ call_tool = monitoring shim
//! ┌─────────────────▼───────────────────────────┐
//! │               Tool Router                    │
//! │  add/get/search, enhance_*, extract_*,      │
//! │  stats/analyze/optimize, metrics/costs      │
//! └───┬─────────┬─────────┬─────────┬───────────┘
//!     │         │         │         │
//! ┌───▼───┐ ┌───▼────┐ ┌──▼─────┐ ┌─▼────────┐
//! │Analyt.│ │Monitor.│ │Enhance │ │ Extract  │
//! │ stats │ │metrics │ │ (LLM)  │ │ (files)  │
//! └───┬───┘ └───┬────┘ └──┬─────┘ └─┬────────┘
//!     │         │         │         │
//! ┌───▼─────────▼─────────▼─────────▼─────────┐
//! │           Dataset façade (trait)           │
//! │   external columnar engine / in-memory     │
//! └────────────────────────────────────────────┘
//! ```

pub mod analytics;
pub mod config;
pub mod dataset;
pub mod embed;
pub mod enhance;
pub mod error;
pub mod extract;
pub mod http;
pub mod llm;
pub mod monitoring;
pub mod security;
pub mod server;
pub mod tools;
pub mod types;
pub mod validation;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::ContextFrameServer;
pub use types::{DocumentStatus, FrameRecord, Metadata, RecordType, Relationship, RelationshipType};
