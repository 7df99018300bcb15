use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

/// Global flag to control per-chunk trace logging
pub static CHUNK_TRACE_ENABLED: AtomicBool = AtomicBool::new(false);

/// Set per-chunk trace logging on/off
pub fn set_chunk_trace(enabled: bool) {
    CHUNK_TRACE_ENABLED.store(enabled, Ordering::Relaxed);
    tracing::info!("🔧 Chunk trace logging {}", if enabled { "ENABLED" } else { "DISABLED" });
}

/// Check if per-chunk trace logging is enabled
pub fn is_chunk_trace_enabled() -> bool {
    CHUNK_TRACE_ENABLED.load(Ordering::Relaxed)
}

/// Install the global subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

/// Chunk debug macro - only logs if chunk tracing is enabled
#[macro_export]
macro_rules! chunk_trace {
    ($($arg:tt)*) => {
        if $crate::log::is_chunk_trace_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_trace_toggle() {
        set_chunk_trace(true);
        assert!(is_chunk_trace_enabled());
        chunk_trace!("visible at debug level: {}", 1);
        set_chunk_trace(false);
        assert!(!is_chunk_trace_enabled());
    }
}
