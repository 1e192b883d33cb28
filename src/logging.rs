//! `env_logger` setup, matching the teacher's logging convention: one
//! `-v` flag escalates from warnings to info to debug.

use log::LevelFilter;

pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).format_timestamp(None).init();
}
