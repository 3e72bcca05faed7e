use env_logger::{Builder, Env};

/// `RUST_LOG` wins; otherwise info and up.
pub fn init() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
