//! Log output for the extract service, the load service and the `rift` CLI.
//!
//! `try_init` also installs the `log` bridge, so actix's access log lines
//! come out through the same formatter as our own events.

use anyhow::Context;
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Used when `RUST_LOG` is unset. sqlx logs every statement at info.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// `RUST_LOG` when set and valid, otherwise `fallback`.
fn pipeline_filter(fallback: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(fallback)
            .with_context(|| format!("invalid log filter {fallback:?}")),
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_tracing(fallback: &str) -> anyhow::Result<()> {
    SubscriberBuilder::default()
        .with_env_filter(pipeline_filter(fallback)?)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_filters_parse() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        assert!(EnvFilter::try_new("rift_etl=debug,actix_web=info").is_ok());
    }

    #[test]
    fn bad_fallback_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let err = pipeline_filter("info,sqlx=loud").unwrap_err();
        assert!(err.to_string().contains("invalid log filter"), "{err}");
    }
}
