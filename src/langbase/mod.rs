//! Langbase Pipes backend.
//!
//! Every completion is one `POST /v1/pipes/run` call against a single
//! configured pipe; a request for `k` samples fans out `k` concurrent calls.

mod client;
mod types;


pub use client::LangbaseClient;
pub use types::*;
