// Violation record wizard
// Main library entry point

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod smoke;
pub mod utils;
pub mod wizard;

use log::{error, info};
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::config::WizardConfig;

fn format_human_line(
    out: fern::FormatCallback,
    message: &std::fmt::Arguments,
    record: &log::Record,
) {
    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let meta = utils::logging::parse_log_metadata(&message.to_string());
    let txt_line = utils::logging::format_human_readable_log(
        &timestamp_local.to_string(),
        record.level(),
        record.target(),
        &meta,
    );
    out.finish(format_args!("{}", txt_line));
}

/// Initialize logging system with dual format (JSON + human-readable)
pub fn init_logging(cfg: &config::LoggingConfig) -> anyhow::Result<PathBuf> {
    let log_dir = utils::path_resolver::resolve_log_folder(cfg.folder.as_deref())?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");

    // JSON log file for structured parsing
    let json_log_file = log_dir.join(format!("wizard-{}.log", timestamp));

    // Human-readable log file (.txt)
    let txt_log_file = log_dir.join(format!("wizard-{}.txt", timestamp));

    let mut dispatch = fern::Dispatch::new().level(log::LevelFilter::Debug);

    if cfg.stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(format_human_line)
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let meta = utils::logging::parse_log_metadata(&message.to_string());
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &meta,
                    );
                    out.finish(format_args!("{}", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(format_human_line)
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(log_dir)
}

fn load_config_or_exit(config_path: Option<&Path>) -> WizardConfig {
    match WizardConfig::load(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Shared driver for the proof modes: logging, a current-thread runtime, exit 1 on failure.
fn run_smoke<F, Fut>(name: &str, config_path: Option<&Path>, smoke: F)
where
    F: FnOnce(WizardConfig) -> Fut,
    Fut: Future<Output = anyhow::Result<PathBuf>>,
{
    let cfg = load_config_or_exit(config_path);
    if let Err(e) = init_logging(&cfg.logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        "[PHASE: initialization] {} smoke starting at {}",
        name,
        chrono::Utc::now()
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build();
    let result = match rt {
        Ok(rt) => rt.block_on(smoke(cfg)),
        Err(e) => Err(anyhow::anyhow!(
            "Failed to create async runtime for {} smoke: {}",
            name,
            e
        )),
    };

    match result {
        Ok(transcript) => {
            info!(
                "[PHASE: smoke] [STEP: complete] {} smoke passed ({:?})",
                name, transcript
            );
            println!("{}", transcript.to_string_lossy());
        }
        Err(e) => {
            error!(
                "[PHASE: smoke] [STEP: complete] {} smoke exited with error: {:?}",
                name, e
            );
            eprintln!("Wizard error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Add-mode wizard scenario against the demo collaborator.
/// Writes `wizard_smoke_transcript.log` under the log folder and exits 0/1.
pub fn run_wizard_smoke(config_path: Option<&Path>) {
    run_smoke("Wizard", config_path, |cfg| async move {
        smoke::wizard_smoke(&cfg).await
    });
}

/// File-backed draft round trip.
/// Writes `draft_smoke_transcript.log` under the log folder and exits 0/1.
pub fn run_draft_smoke(config_path: Option<&Path>) {
    run_smoke("Draft", config_path, |cfg| async move {
        smoke::draft_smoke(&cfg).await
    });
}

/// Print the effective configuration (file + environment) as TOML.
pub fn run_print_config(config_path: Option<&Path>) {
    let cfg = load_config_or_exit(config_path);
    match cfg.to_toml() {
        Ok(rendered) => print!("{}", rendered),
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}
