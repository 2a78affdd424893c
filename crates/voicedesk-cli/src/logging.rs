use tracing_subscriber::EnvFilter;

use voicedesk_core::config::Config;

/// Initialise the global subscriber. `RUST_LOG` wins over the config.
pub fn init(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let logging = config.logging.clone().unwrap_or_default();

    let level = if verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("warn")
    };
    let mut directives = vec![level.to_string()];
    directives.extend(logging.filters.iter().cloned());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives.join(",")));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let json = logging.format == "json";
    let stdout = logging.output == "stdout";

    let result = match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).try_init(),
        (true, false) => builder.json().with_writer(std::io::stderr).try_init(),
        (false, true) => builder.with_writer(std::io::stdout).try_init(),
        (false, false) => builder.with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}
