//! Shared logging setup for the dataferry binary.

use crate::Result;

/// Initializes structured logging.
///
/// # Arguments
/// * `debug` - If true, log at DEBUG level (discovery steps, resolved params)
/// * `quiet` - If true, only show ERROR level logs; overrides `debug`
pub fn init_logging(debug: bool, quiet: bool) -> Result<()> {
    let level = match (quiet, debug) {
        (true, _) => tracing::Level::ERROR,
        (false, false) => tracing::Level::INFO,
        (false, true) => tracing::Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| {
            crate::error::EtlError::configuration(format!("Failed to initialize logging: {}", e))
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    // Logging can only be initialized once per test process, so only the
    // level selection logic is verified here.

    #[test]
    fn test_level_selection() {
        let cases = [
            ((true, false), tracing::Level::ERROR),
            ((true, true), tracing::Level::ERROR),
            ((false, false), tracing::Level::INFO),
            ((false, true), tracing::Level::DEBUG),
        ];

        for ((quiet, debug), expected) in cases {
            let level = match (quiet, debug) {
                (true, _) => tracing::Level::ERROR,
                (false, false) => tracing::Level::INFO,
                (false, true) => tracing::Level::DEBUG,
            };
            assert_eq!(level, expected, "quiet={quiet}, debug={debug}");
        }
    }
}
