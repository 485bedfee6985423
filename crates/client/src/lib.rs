//! Client for the persisto gateway's `/memory/*` routes.
//!
//! Requests carry a bearer API key. Rate limits, 5xx answers and transport
//! failures are retried with exponential backoff; auth and lookup failures
//! are returned immediately as typed [`ClientError`]s.

pub mod client;
pub mod error;

pub use {
    client::{API_URL_ENV, DEFAULT_BASE_URL, DeleteResponse, PersistoClient, SaveResponse},
    error::ClientError,
};
