//! Shared test utilities for controller, property and chaos tests.
//!
//! This module provides:
//! - Release and stored-record builders
//! - A recording [`EventSink`](release_watch::sink::EventSink) with failure injection
//! - A [`RecordStore`](release_watch::store::RecordStore) wrapper with failure injection

#![allow(dead_code)]

pub mod fixtures;
pub mod flaky_store;
pub mod mock_sink;

pub use fixtures::*;
pub use flaky_store::*;
pub use mock_sink::*;
