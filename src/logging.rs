use env_logger::{Builder, Env};

/// Initialize logging with a filter taken from the `NAVAL_LOG` environment variable.
/// Defaults to `info` if the variable is not set. Calling it twice is harmless.
pub fn init_logging() {
    let env = Env::new().filter_or("NAVAL_LOG", "info");
    let _ = Builder::from_env(env)
        .format_timestamp_millis()
        .format_target(false)
        .try_init();
}
