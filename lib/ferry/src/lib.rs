//! Fluent HTTP client with functional options, a middleware chain and retries.
//!
//! Every call goes through the same pipeline: options are resolved (client
//! level, then call level), the request is prepared, the middleware chain is
//! composed around the transport, and the chain runs with retries under an
//! optional deadline.
//!
//! # Example
//!
//! ```ignore
//! use ferry::{Middleware, opt};
//! use std::time::Duration;
//!
//! let response = ferry::get(
//!     "https://example.com/test/get",
//!     &[
//!         opt::timeout(Duration::from_millis(500)),
//!         opt::retry_times(2),
//!         opt::middleware(Middleware::expect_status(200)),
//!     ],
//! )
//! .await?;
//! println!("{}", response.text());
//! ```
//!
//! Options are plain values and can be shared:
//!
//! ```ignore
//! let client = ferry::Client::builder()
//!     .option(opt::basic_auth("user", "secret"))
//!     .build();
//! client.post_form(url, [("a", "1"), ("b", "2")], &[]).await?;
//! ```

mod client;
mod config;
pub mod middleware;
pub mod opt;
mod options;
pub mod prelude;
pub mod transport;

pub use client::{
    Client, ClientBuilder, default_client, execute, get, head, post, post_form,
};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_MAX_REDIRECTS};
pub use middleware::{Executor, Middleware, compose};
pub use options::{Opt, Options};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use ferry_core::{
    Body, ContentType, Context, Cookie, Error, Method, Request, RequestBuilder, Response, Result,
    SameSite, StatusCode, basic_auth_token, from_json, header, marshal, marshal_string, to_json,
};

// Re-export url for request construction
pub use url;
