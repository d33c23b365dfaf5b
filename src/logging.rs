//! Tracing subscriber setup for the binary.
//!
//! Filter precedence: `BEECONNECT_LOG`, then `RUST_LOG`, then
//! [`DEFAULT_DIRECTIVES`]. The defaults keep this crate at `info` and the
//! socket/TLS/HTTP stack underneath at `warn`, since a reconnecting relay
//! otherwise floods the log with handshake chatter.

use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_DIRECTIVES: &str = "warn,beeconnect=info";
/// Added on `--verbose`: engine flow and per-message transport traces.
pub const VERBOSE_DIRECTIVES: &str = "warn,beeconnect=debug,tower_http=debug";

/// Filter string for the given explicit setting and verbosity.
pub fn directives(explicit: Option<String>, verbose: bool) -> String {
    match explicit.filter(|d| !d.trim().is_empty()) {
        Some(d) => d,
        None if verbose => VERBOSE_DIRECTIVES.to_string(),
        None => DEFAULT_DIRECTIVES.to_string(),
    }
}

/// Install the global subscriber on stderr. `BEECONNECT_LOG_JSON=1`
/// switches to JSON lines.
pub fn init_logging(verbose: bool) {
    let explicit = std::env::var("BEECONNECT_LOG").ok().or_else(|| std::env::var("RUST_LOG").ok());
    let directives = directives(explicit, verbose);
    let env_filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("ignoring log filter {directives:?}: {e}");
        EnvFilter::new(DEFAULT_DIRECTIVES)
    });
    let use_json = std::env::var("BEECONNECT_LOG_JSON")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        // Targets only when verbose, where relay, bridge and engine lines interleave.
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(verbose)
            .compact()
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        assert_eq!(directives(Some("beeconnect::transport=trace".into()), true), "beeconnect::transport=trace");
        assert_eq!(directives(Some("  ".into()), false), DEFAULT_DIRECTIVES);
        assert_eq!(directives(None, true), VERBOSE_DIRECTIVES);
    }

    #[test]
    fn default_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
        assert!(EnvFilter::try_new(VERBOSE_DIRECTIVES).is_ok());
    }
}
