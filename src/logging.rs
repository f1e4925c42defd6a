use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

/// console logger for consumers and tests; repeated calls are harmless
pub fn init_console_logging(level: LevelFilter) {
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}
