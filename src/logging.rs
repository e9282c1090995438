//! Structured logging — `tracing` for ordinary application logs, plus an
//! auto-routing `clog_*` macro family that derives a category from
//! `module_path!()`, trimmed down from the reference architecture's
//! `logging` module: that version queues entries through a Unix-socket
//! logger worker process; this system has no separate logger process, so
//! `clog_*` here emits directly through `tracing` with `category` and
//! `component` fields instead of writing to per-category files.
//!
//! ```rust
//! use reception_core::clog_info;
//! clog_info!("call {} entered LISTENING", call_id);
//! ```

/// Convert `module_path!()` into a coarse log category, mirroring the
/// reference architecture's `modules/voice`, `modules/orm`, `system/ipc`
/// style routing, adapted to this crate's module names.
pub fn module_path_to_category(module_path: &str) -> &'static str {
    let path = module_path
        .strip_prefix("reception_core::")
        .unwrap_or(module_path);

    if path.starts_with("voice::") {
        "modules/voice"
    } else if path.starts_with("storage::") {
        "modules/storage"
    } else if path.starts_with("embedding::") {
        "modules/embedding"
    } else if path.starts_with("retrieval::") {
        "modules/retrieval"
    } else if path.starts_with("reasoning::") {
        "modules/reasoning"
    } else if path.starts_with("orchestrator::") {
        "modules/orchestrator"
    } else if path.starts_with("gateway::") {
        "modules/gateway"
    } else if path.starts_with("cache") {
        "modules/cache"
    } else if path.starts_with("admin::") {
        "modules/admin"
    } else if path.starts_with("config") {
        "system/config"
    } else {
        "system/core"
    }
}

/// Last segment of a module path, used as the log `component` field.
pub fn extract_component(module_path: &str) -> &str {
    module_path.rsplit("::").next().unwrap_or(module_path)
}

#[macro_export]
macro_rules! clog_info {
    ($($arg:tt)*) => {{
        let category = $crate::logging::module_path_to_category(module_path!());
        let component = $crate::logging::extract_component(module_path!());
        tracing::info!(category, component, message = %format!($($arg)*));
    }};
}

#[macro_export]
macro_rules! clog_warn {
    ($($arg:tt)*) => {{
        let category = $crate::logging::module_path_to_category(module_path!());
        let component = $crate::logging::extract_component(module_path!());
        tracing::warn!(category, component, message = %format!($($arg)*));
    }};
}

#[macro_export]
macro_rules! clog_error {
    ($($arg:tt)*) => {{
        let category = $crate::logging::module_path_to_category(module_path!());
        let component = $crate::logging::extract_component(module_path!());
        tracing::error!(category, component, message = %format!($($arg)*));
    }};
}

#[macro_export]
macro_rules! clog_debug {
    ($($arg:tt)*) => {{
        let category = $crate::logging::module_path_to_category(module_path!());
        let component = $crate::logging::extract_component(module_path!());
        tracing::debug!(category, component, message = %format!($($arg)*));
    }};
}

/// Initialize the global `tracing` subscriber. Idempotent within a process
/// (subsequent calls after the first are no-ops, matching the reference
/// architecture's idempotent `init_logger`).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_path_conversion() {
        assert_eq!(
            module_path_to_category("reception_core::voice::stt"),
            "modules/voice"
        );
        assert_eq!(
            module_path_to_category("reception_core::storage::sqlite"),
            "modules/storage"
        );
    }

    #[test]
    fn test_extract_component() {
        assert_eq!(
            extract_component("reception_core::voice::stt"),
            "stt"
        );
    }
}
