// tests/gateway/fixtures/mod.rs

pub mod test_clock;
