//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing with `info` as the default level. `RUST_LOG`
/// overrides.
pub fn init() {
    init_with_default("info");
}

/// Initialize tracing with an explicit fallback directive, used when
/// `RUST_LOG` is unset. Embedders that run the workers inside a chattier
/// host process pass something like `"warn,postforge=info"`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with_default(directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));

    // JSON lines with timestamps; worker threads show up via their
    // `worker = <name>` field rather than the log target.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
