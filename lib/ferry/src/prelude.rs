//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and functions for
//! easy glob importing:
//!
//! ```ignore
//! use ferry::prelude::*;
//! ```

pub use crate::transport::{CookieJar, Proxy, RedirectPolicy};
pub use crate::{
    Body, Client, ClientConfig, Context, Cookie, Error, Executor, Method, Middleware, Opt,
    Request, Response, Result, StatusCode, opt,
};
