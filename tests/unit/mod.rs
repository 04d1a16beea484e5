//! Integration test harness for the exchange core.

mod common;
mod exchange_tests;
mod invariant_tests;
mod replay_tests;
mod scenario_tests;
