//! # steroids-domain
//!
//! Pure domain model for the steroids service framework.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **notices** (the per-invocation error and notice channels)
//! - Define the **error taxonomy** (definition, execution, unexpected)
//! - Define **jobs** (the payload handed to a background queue)
//! - Define the **environment** a process runs in
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod environment;
pub mod job;
pub mod notice;
