//! Prelude module for convenient imports.
//!
//! ```ignore
//! use ferry_core::prelude::*;
//! ```

pub use crate::{
    Body, ContentType, Context, Cookie, Error, Method, Request, RequestBuilder, Response, Result,
    StatusCode, from_json, to_json,
};
