use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;

use libdns_reduction::config::Config;
use libdns_reduction::error::ConfigError;
use libdns_reduction::process::process;
use libdns_reduction::run_status::Stage;
use libdns_reduction::script_runner::CancelToken;

fn make_template_config(path: &Path) -> Result<(), ConfigError> {
    Config::default().write_config_file(path)
}

fn path_arg() -> Arg {
    Arg::new("path")
        .short('p')
        .long("path")
        .help("Path to the configuration file")
}

fn main() {
    // Create a cli
    let matches = Command::new("dns_reduction_cli")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file")
                .arg(path_arg()),
        )
        .subcommand(
            Command::new("run")
                .about("Generate the reduction script and run it against the dry-run toolkit")
                .arg(path_arg()),
        )
        .arg(path_arg())
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    // Parse the cli
    let (sub_name, path) = match matches.subcommand() {
        Some((name, sub)) => (name, sub.get_one::<String>("path")),
        None => ("generate", matches.get_one::<String>("path")),
    };
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => {
            log::error!("A configuration file must be given with -p/--path");
            return;
        }
    };

    if sub_name == "new" {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("{e}"),
        }
        return;
    }
    let execute = sub_name == "run";

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Data Path: {}", config.paths.data_dir.to_string_lossy());
    log::info!(
        "Standards Path: {}",
        config.paths.standards_dir.to_string_lossy()
    );
    log::info!("Script Path: {}", config.paths.script_dir.to_string_lossy());
    log::info!(
        "First Run: {} Last Run: {}",
        config.sample_runs.first,
        config.sample_runs.last
    );
    if config.exports_data() {
        log::info!("Export Path: {}", config.paths.export_dir);
    }

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    let (tx, rx) = channel();
    // Spawn the task! Runs are not interruptible from the CLI, so the token is never cancelled
    let handle = std::thread::spawn(move || process(config, execute, tx, CancelToken::new()));

    loop {
        std::thread::sleep(std::time::Duration::from_millis(200));
        while let Ok(status) = rx.try_recv() {
            pb.set_position((status.progress * 100.0) as u64);
            if status.stage == Stage::Running && status.step == 0 {
                log::info!("Running script with {} steps...", status.total_steps);
            }
        }

        if handle.is_finished() {
            match handle.join() {
                Ok(result) => match result {
                    Ok(status) if status.is_empty() => {
                        if execute {
                            log::info!("Successfully ran reduction script!")
                        } else {
                            log::info!("Successfully generated reduction script!")
                        }
                    }
                    Ok(status) => log::warn!("Script stopped: {status}"),
                    Err(e) => log::error!("Reduction failed with error: {e}"),
                },
                Err(_) => log::error!("Failed to join reduction task!"),
            }
            break;
        }
    }

    pb.finish();

    log::info!("Done.");
}
