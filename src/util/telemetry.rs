use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::util::env::LogFormat;

pub const DEFAULT_FILTER: &str = "modbot=debug,sqlx=warn,info";

/// Installs the global subscriber. `RUST_LOG` overrides [`DEFAULT_FILTER`] when set.
pub fn register(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .init(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_filter_directives() {
        let filter = EnvFilter::try_new(DEFAULT_FILTER).unwrap();
        let rendered = filter.to_string();

        for directive in ["modbot=debug", "sqlx=warn", "info"] {
            assert!(rendered.contains(directive), "{rendered}");
        }
        assert!(!rendered.contains("reqwest"));
    }
}
