//! Execution context carried by a [`Request`](crate::Request).
//!
//! A [`Context`] holds caller-supplied key/value pairs and an optional
//! deadline. Middleware can read values back with [`Context::value`]; the
//! request pipeline turns a configured timeout into a deadline and aborts the
//! call once it elapses.

use std::time::{Duration, Instant};

/// Key/value pairs and deadline attached to a request.
///
/// Values are kept in insertion order. Looking a key up returns the most
/// recently inserted value, so later pairs shadow earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    values: Vec<(String, String)>,
    deadline: Option<Instant>,
}

impl Context {
    /// Creates an empty context without deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this context with one more key/value pair.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Appends a key/value pair.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.push((key.into(), value.into()));
    }

    /// Latest value stored under `key`.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All pairs in insertion order, shadowed ones included.
    pub fn values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Bounds the context by `timeout` from now.
    ///
    /// A zero timeout leaves the context unchanged, and an existing earlier
    /// deadline is kept.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.shorten_deadline(Instant::now() + timeout);
        }
        self
    }

    /// Sets the deadline unless an earlier one is already present.
    pub fn shorten_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        });
    }

    /// Time left before the deadline; `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}
