//! Creative (LLM) analysis
//!
//! The client talks to the local chat-completion server; responses go
//! through the tolerant repair parser and taxonomy normalization. Any
//! failure yields defaulted facts plus a status string, never an error.

mod client;
mod normalize;
mod repair;

pub use client::{
    status_model_missing, CreativeClient, CreativeOutcome, STATUS_OFFLINE, STATUS_OK,
    STATUS_PARSE_ERROR,
};
pub use normalize::normalize_response;
pub use repair::{parse_lenient, repair};
