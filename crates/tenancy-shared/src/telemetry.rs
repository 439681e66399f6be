//! Telemetry setup
//!
//! Production gets JSON lines for log shipping; everything else gets the
//! compact human format. `RUST_LOG` always wins over the built-in filter.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppSettings;

pub fn init_telemetry(app: &AppSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&app.env)));

    if app.env == "production" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().compact())
            .init();
    }
}

/// Filter used when `RUST_LOG` is unset: the tenancy crates at full detail,
/// sqlx query logging capped at warn.
fn default_filter(env: &str) -> String {
    let level = if env == "production" { "info" } else { "debug" };
    format!("info,tenancy_core={level},tenancy_infrastructure={level},sqlx=warn")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_per_environment() {
        let dev = default_filter("development");
        assert!(dev.contains("tenancy_core=debug"));
        assert!(dev.contains("sqlx=warn"));

        let prod = default_filter("production");
        assert!(prod.contains("tenancy_core=info"));
        assert!(prod.contains("tenancy_infrastructure=info"));
    }
}
