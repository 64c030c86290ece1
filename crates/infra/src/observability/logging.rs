use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
pub const LOG_FILTER_ENV: &str = "SELLERSCAN_LOG";

const DEFAULT_FILTER: &str = "info";

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" | "plain" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Filter directives from `SELLERSCAN_LOG`, then `RUST_LOG`, then `info`.
pub fn filter_directives() -> String {
    [LOG_FILTER_ENV, "RUST_LOG"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global tracing subscriber.
///
/// Invalid directives fall back to `info`. Calling this twice returns an error
/// instead of replacing the installed subscriber.
pub fn init_tracing(format: LogFormat) -> Result<(), String> {
    let directives = filter_directives();
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => {
            registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()
        }
    };

    installed.map_err(|e| format!("failed to install tracing subscriber: {e}"))?;
    tracing::debug!(filter = %directives, ?format, "tracing initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn parses_formats() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn sellerscan_log_wins_over_rust_log() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        std::env::set_var(LOG_FILTER_ENV, "sellerscan_infra=debug");
        std::env::set_var("RUST_LOG", "warn");
        let directives = filter_directives();
        std::env::remove_var(LOG_FILTER_ENV);
        std::env::remove_var("RUST_LOG");

        assert_eq!(directives, "sellerscan_infra=debug");
    }

    #[test]
    fn falls_back_to_info() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        std::env::remove_var(LOG_FILTER_ENV);
        std::env::set_var("RUST_LOG", "  ");
        let directives = filter_directives();
        std::env::remove_var("RUST_LOG");

        assert_eq!(directives, "info");
    }
}
