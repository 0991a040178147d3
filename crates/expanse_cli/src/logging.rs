//! Diagnostic logging to stderr.

use tracing_subscriber::EnvFilter;

use crate::GlobalArgs;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "EXPANSE_LOG";

/// Picks the filter directive: `--verbose` and `--quiet` override
/// `$EXPANSE_LOG`, which overrides the `warn` default.
pub fn directive_for(global: &GlobalArgs, env: Option<&str>) -> String {
    if global.verbose {
        return "debug".to_string();
    }
    if global.quiet {
        return "error".to_string();
    }
    match env {
        Some(directive) if EnvFilter::try_new(directive).is_ok() => directive.to_string(),
        _ => "warn".to_string(),
    }
}

/// Installs the global subscriber. Stdout stays reserved for command output.
pub fn init(global: &GlobalArgs) {
    let env = std::env::var(LOG_ENV).ok();
    let filter = EnvFilter::new(directive_for(global, env.as_deref()));
    // A second install keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(global.color)
        .with_target(false)
        .try_init();
}
