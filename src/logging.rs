use tracing::Level;

/// Map the number of `-v` flags to a log level.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    }
}

/// Install the stderr subscriber. Stdout stays reserved for progress lines.
///
/// Thread names are included so each line shows which `robot-N` wrote it.
pub fn init(verbosity: u8) {
    let level = level_for(verbosity);
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(level = %level, "log level set");
    }
}
