//! Shared test utilities for crawlsync integration tests.
//!
//! - `JobPayload` builds raw job payloads in either key convention
//! - `ScriptedConnector` drives the stream manager without a network
//! - `FakeCrawlService` serves the REST API and the WebSocket stream on
//!   loopback

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
