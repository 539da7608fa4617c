// tests/gateway/main.rs

// test modules
mod fixtures;
mod router_tests;
mod scenario_tests;

// Re-export common test utilities
pub use fixtures::test_clock::TestClock;
