use log::LevelFilter;

// Install the platform logger. Safe to call more than once;
// only the first call has any effect.
#[cfg(target_os = "android")]
pub fn init(level: LevelFilter) {
    let config = match level.to_level() {
        Some(l) => android_logger::Config::default().with_min_level(l),
        None => android_logger::Config::default(),
    };
    android_logger::init_once(config);
}

#[cfg(not(target_os = "android"))]
pub fn init(level: LevelFilter) {
    // RUST_LOG still overrides what the command line asked for.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}

// Map a `-v` count onto a level, starting at warnings.
pub fn level_from_verbosity(verbose: u8) -> LevelFilter {
    return match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
}
