//! HTTP transport for the tool manual
//!
//! A dependency-light HTTP/1.1 listener, a pattern-based router, and the
//! bracket-notation query decoder the router feeds into each request context.

pub mod context;
pub mod handlers;
pub mod listener;
pub mod query;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;
