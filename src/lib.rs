//! Stratum - Layered Sample Record Management
//!
//! Stratum manages cores of depth-indexed scientific samples and derives
//! new attribute layers from them by running named computation plans.
//!
//! # Architecture
//!
//! Every sample is a stack of layers: the immutable `input` layer holds
//! the originally imported values, and each committed computation plan
//! adds one more. Attribute lookups resolve through the stack, newest
//! plan first, so applying or stripping a plan never touches the
//! original data.
//!
//! Plans run off the interactive path on a worker thread against an
//! isolated working copy of the core. A run either commits its finished
//! layer atomically or is rolled back in full — on failure and on
//! cooperative cancellation alike.
//!
//! Browsing composes three pure stages over a core's materialized
//! samples: a named filter, a text search across the active view's
//! attributes, and a stable two-key sort that always places undefined
//! values last.

pub mod browse;
pub mod cli;
pub mod error;
pub mod export;
pub mod import;
pub mod model;
pub mod plan;
pub mod registry;
pub mod store;

pub use error::{Result, StratumError};
