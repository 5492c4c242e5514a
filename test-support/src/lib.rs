pub mod fake_recaptcha;
pub mod fake_smtp;

use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

/// Sends `log` records, including those forwarded from `tracing`, to the terminal.
pub fn setup_logging() {
    let _ = TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}
