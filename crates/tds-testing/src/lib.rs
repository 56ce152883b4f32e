//! # tds-testing
//!
//! Test infrastructure for the TDS client.
//!
//! [`MockTdsServer`] is a scripted server that accepts a Login7, answers
//! SQL batches from a table of canned responses, and records what it
//! received. [`ResponseBuilder`] assembles arbitrary token streams,
//! including ones a real server would never send, for negative tests.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_server;
pub mod tokens;

pub use mock_server::{
    LOGIN_FAILED, MockColumn, MockResponse, MockServerBuilder, MockServerError, MockTdsServer,
    RecordedBatch,
};
pub use tokens::ResponseBuilder;
