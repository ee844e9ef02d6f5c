//! Shared test utilities
//!
//! Note: clippy reports false-positive dead_code warnings because it can't
//! trace usage across test binaries. These utilities are used by multiple tests.

#![allow(dead_code)]

pub mod fake_engine;
pub mod scripted;

use std::sync::Arc;

use roodb_regress::config::HarnessConfig;
use roodb_regress::suite::SharedTopology;
use roodb_regress::topology::{ReferenceInterpreter, Schema, Topology};

pub use fake_engine::FakeEngine;
pub use scripted::{Outcome, ScriptedConnector};

/// Two plain tables, one materialized view, one export stream, one procedure
pub fn test_schema() -> Schema {
    Schema::new("regress")
        .statement("CREATE TABLE ORDERS (ID BIGINT)")
        .statement("CREATE VIEW ORDER_COUNTS AS SELECT COUNT(*) FROM ORDERS")
        .statement("CREATE STREAM ORDER_EVENTS (ID BIGINT)")
        .statement("CREATE TABLE ITEMS (ID BIGINT)")
        .statement("CREATE PROCEDURE ADD_ORDER AS INSERT INTO ORDERS VALUES (?)")
}

pub fn test_config() -> HarnessConfig {
    HarnessConfig::new().with_seed(7)
}

/// A compiled reference topology over a fresh [`FakeEngine`]
pub fn reference_topology() -> (Arc<FakeEngine>, SharedTopology) {
    roodb_regress::logging::init_test_logging();
    let engine = Arc::new(FakeEngine::new());
    let mut topology = Topology::from(ReferenceInterpreter::new(engine.clone(), test_config()));
    assert!(topology.compile(&test_schema()));
    (engine, Arc::new(tokio::sync::Mutex::new(topology)))
}
