use std::{env, path::Path, time::SystemTime};
use log::{info, LevelFilter};
use salesproc_models::errors::SendableError;

pub fn format_line(timestamp: SystemTime, level: log::Level, target: &str, message: &str) -> String {
    format!(
        "[{} {} {}] {}",
        humantime::format_rfc3339_seconds(timestamp),
        level,
        target,
        message
    )
}

pub fn setup_logger(level: LevelFilter, log_file: Option<&Path>) -> Result<(), SendableError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(
                    SystemTime::now(),
                    record.level(),
                    record.target(),
                    &message.to_string()
                )
            ))
        })
        .level(level)
        // lapin and its reactor are chatty at info.
        .level_for("lapin", LevelFilter::Warn)
        .level_for("pinky_swear", LevelFilter::Warn)
        .chain(std::io::stdout());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

pub fn print_env() -> std::io::Result<()> {
    let path = env::current_dir()?;
    info!("The current directory is {}", path.display());
    Ok(())
}
