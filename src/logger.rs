use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

pub fn init(level: LevelFilter) {
    let result = Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        // chromiumoxide reports every unknown CDP event at warn/error.
        .filter(Some("chromiumoxide"), LevelFilter::Off)
        .try_init();

    match result {
        Ok(()) => log::info!("Logger initialized at level {}.", level),
        Err(e) => eprintln!("Logger already initialized: {}", e),
    }
}
