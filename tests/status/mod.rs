//! End-to-end scenarios for the status facade over an in-memory node.
//!
//! Run with `cargo test --test status`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod harness;
mod mempool;
mod payments;
mod searches;

pub use harness::StatusHarness;
