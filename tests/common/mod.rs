//! Common test utilities for integration tests.

pub mod mock_source;

pub use mock_source::{Feed, MockEventSource};
