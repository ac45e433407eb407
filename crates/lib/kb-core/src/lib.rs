//! Core of the knowledge-base tool bridge.
//!
//! Tool definitions and argument validation live in [`tools`] and [`schema`],
//! the child-process lifecycle in [`runner`], and [`bridge`] ties them together
//! behind a single `call` per invocation.

pub mod bridge;
pub mod config;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod tools;
