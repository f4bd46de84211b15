//! Core types for the ferry HTTP client.
//!
//! This crate provides the transport-agnostic types used by ferry:
//! - [`Request`] and [`RequestBuilder`] - outgoing requests
//! - [`Response`] - drained responses with cached accessors
//! - [`Context`] - key/value pairs and deadline travelling with a request
//! - [`Body`] - request payloads, replayable on retry and redirect
//! - [`Cookie`] - request and `Set-Cookie` cookies
//! - [`Error`] and [`Result`] - error handling
//! - [`Method`], [`StatusCode`] and [`header`] - re-exported from the `http` crate

mod body;
mod context;
mod cookie;
mod error;
pub mod prelude;
mod request;
mod response;

pub use body::{
    Body, ContentType, basic_auth_token, encode_pairs, from_json, marshal, marshal_string,
    to_json,
};
pub use context::Context;
pub use cookie::{Cookie, SameSite};
pub use error::{Error, Result};
pub use request::{Request, RequestBuilder};
pub use response::Response;

// Re-export http crate types for methods, status codes and headers
pub use http::{Method, StatusCode, header};
