//! RooDB regression harness
//!
//! Runs the same test logic against interchangeable backend topologies and
//! checks that their results agree:
//! - Topologies: a native cluster, a single native server, or an
//!   in-process reference interpreter behind one lifecycle
//! - Client acquisition with random address choice and one retry
//! - Per-test isolation by soft reset instead of relaunch
//! - Type-aware result comparison with explicit tolerances

pub mod assertions;
pub mod client;
pub mod compare;
pub mod config;
pub mod error;
pub mod logging;
pub mod suite;
pub mod topology;
pub mod types;

pub use error::{HarnessError, HarnessResult};
