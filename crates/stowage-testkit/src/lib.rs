//! # Stowage Testkit
//!
//! Testing utilities for Stowage.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: The reference scenario schema and helpers to open it
//! - **Generators**: Proptest strategies for records, keys and mutations
//!
//! The end-to-end scenario, property and SQLite persistence tests live in
//! this crate's `tests/` directory.
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use stowage_testkit::generators::records;
//!
//! proptest! {
//!     #[test]
//!     fn length_tracks_adds(records in records(20)) {
//!         // open a connection, add `records`, check `length`
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust,no_run
//! use stowage_testkit::fixtures::{TestFixture, ITEMS};
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let conn = fixture.scenario().await.unwrap();
//!     assert_eq!(conn.length(ITEMS).unwrap(), Some(2));
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{open_scenario, record, scenario_config, TestFixture};
