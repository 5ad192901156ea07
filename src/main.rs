use std::path::PathBuf;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Optional explicit configuration file: --config=<path>
    let config_path = args
        .iter()
        .find_map(|a| a.strip_prefix("--config="))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let config_path = config_path.as_deref();

    // Print the effective configuration (defaults + file + environment) and exit.
    if args.iter().any(|a| a == "--print-config") {
        violation_wizard::run_print_config(config_path);
        return;
    }

    // Non-interactive add-mode wizard proof mode against the demo record service.
    // Writes `wizard_smoke_transcript.log` under the log folder and exits 0/1.
    if args.iter().any(|a| a == "--wizard-smoke") {
        violation_wizard::run_wizard_smoke(config_path);
        return;
    }

    // File-backed draft save/resume/discard proof mode.
    // Writes `draft_smoke_transcript.log` under the log folder and exits 0/1.
    if args.iter().any(|a| a == "--draft-smoke") {
        violation_wizard::run_draft_smoke(config_path);
        return;
    }

    eprintln!("Usage: violation-wizard [--config=<path>] --wizard-smoke | --draft-smoke | --print-config");
    std::process::exit(2);
}
