//! Logger setup for binaries embedding the engine.

/// Initializes `env_logger`; `RUST_LOG` overrides the default level.
///
/// Safe to call more than once: later calls are ignored.
pub fn init_logger(verbose: bool) {
    let _ = env_logger::Builder::new()
        .filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .try_init();
}
