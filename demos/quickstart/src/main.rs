//! Quickstart Example
//!
//! Demonstrates ferry's functional options, middleware chain and retries
//! against httpbin.org.
//!
//! Run with `RUST_LOG=ferry=debug` to see the request dumps.

// Example-specific lint allowances
#![allow(missing_docs)]
#![allow(clippy::print_stdout)]

use std::time::Duration;

use ferry::prelude::*;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Data Types
// ============================================================================

/// A note posted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub done: bool,
}

/// The part of httpbin's echo we read back.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub json: Option<Note>,
    pub url: String,
}

// ============================================================================
// Client
// ============================================================================

/// Client shared by every call in this demo.
fn client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .option(opt::header("User-Agent", "ferry-quickstart"))
        .option(opt::timeout(Duration::from_secs(5)))
        .option(opt::middleware(Middleware::logging()))
        .build()
}

/// Posts `note` as JSON, retrying twice unless the server answers 200.
async fn post_note(client: &Client, base_url: &str, note: Note) -> Result<Echo> {
    let request = Request::parse(Method::POST, &format!("{base_url}/post"))?;
    let response = client
        .execute(
            request,
            &[
                opt::json(note),
                opt::query("source", "quickstart"),
                opt::retry_times(2),
                opt::middleware(Middleware::expect_status(200)),
            ],
        )
        .await?;
    response.json()
}

#[tokio::main]
async fn main() -> ferry::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client = client();

    println!("=== Simple GET ===");
    let response = client
        .get("https://httpbin.org/get", &[opt::debug(true)])
        .await?;
    println!("{}", response.status_line());

    println!("\n=== JSON POST with retries ===");
    let echo = post_note(
        &client,
        "https://httpbin.org",
        Note {
            title: "try ferry".to_string(),
            done: false,
        },
    )
    .await?;
    println!("{} echoed {:?}", echo.url, echo.json);

    println!("\n=== Form POST ===");
    let response = client
        .post_form(
            "https://httpbin.org/post",
            [("name", "ferry"), ("kind", "client")],
            &[opt::basic_auth("demo", "secret")],
        )
        .await?;
    println!("{}", response.status_line());

    Ok(())
}
