// src/logging.rs
//! Logger setup for hosts and tests.

use env_logger::{Builder, Env};

/// Initialise `env_logger` with `level` as the default filter. `RUST_LOG`
/// still wins when set. Repeated calls are ignored.
pub fn init_logging(level: &str) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level));
    // under the test harness output goes through the captured stdout
    builder.format_timestamp_millis().is_test(cfg!(test));
    if builder.try_init().is_err() {
        log::debug!("logger already initialised, keeping the existing one");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging("debug");
        init_logging("info");
        log::info!("logging initialised");
    }
}
