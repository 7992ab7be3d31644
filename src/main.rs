mod artifact_fetcher;
mod artifact_publish;
mod config;
mod config_persistence;
mod cover_probe;
mod driver;
mod output_editor;
mod output_sinks;
mod song;
mod song_source;
mod text_template;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use artifact_fetcher::ArtifactFetcher;
use config::{Config, OutputConfig};
use config_persistence::{
    load_config_file, persist_loaded_config, resolve_config_path, LoadedConfig,
};
use driver::Driver;
use log::{info, warn};
use song_source::{JsonFileSource, SongSource};

const USAGE: &str = "usage: songsink [run]
       songsink add-output <format> <path> [--log]
       songsink remove-output <index>
       songsink list-outputs
       songsink preview <format>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run,
    AddOutput {
        format: String,
        path: PathBuf,
        log_mode: bool,
    },
    RemoveOutput(usize),
    ListOutputs,
    Preview(String),
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    let Some(name) = args.first() else {
        return Ok(Command::Run);
    };
    match name.as_str() {
        "run" => Ok(Command::Run),
        "add-output" => {
            let (Some(format), Some(path)) = (args.get(1), args.get(2)) else {
                return Err("add-output needs <format> <path>".to_string());
            };
            let log_mode = match args.get(3).map(String::as_str) {
                None => false,
                Some("--log") => true,
                Some(other) => return Err(format!("unexpected argument '{other}'")),
            };
            Ok(Command::AddOutput {
                format: format.clone(),
                path: PathBuf::from(path),
                log_mode,
            })
        }
        "remove-output" => args
            .get(1)
            .and_then(|index| index.parse::<usize>().ok())
            .map(Command::RemoveOutput)
            .ok_or_else(|| "remove-output needs a numeric <index>".to_string()),
        "list-outputs" => Ok(Command::ListOutputs),
        "preview" => args
            .get(1)
            .cloned()
            .map(Command::Preview)
            .ok_or_else(|| "preview needs <format>".to_string()),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn print_outputs(config: &Config) {
    if config.outputs.is_empty() {
        println!("no outputs configured");
        return;
    }
    for (index, output) in config.outputs.iter().enumerate() {
        let mode = if output.log_mode { " (log)" } else { "" };
        println!(
            "{index}: \"{}\" -> {}{mode}",
            output.format,
            output.path.display()
        );
    }
}

fn preview(config: &Config, format: &str) {
    let mut source = JsonFileSource::new(config.source.snapshot_path.clone());
    let song = source.snapshot().unwrap_or_else(|err| {
        warn!("{}; previewing against an empty song", err);
        song::SongSnapshot::new()
    });
    let rendered =
        text_template::render_template(format, &song, &config.general.render_options());
    println!("{rendered}");
}

fn run(config: &Config) {
    if config.outputs.is_empty() {
        warn!("No outputs configured. Add one with `songsink add-output <format> <path>`");
    }
    let source = JsonFileSource::new(config.source.snapshot_path.clone());
    info!("Reading snapshots from {}", source.path().display());
    let fetcher = ArtifactFetcher::new(&config.network);
    let mut driver = Driver::new(config, Box::new(source), Box::new(fetcher));
    let stop = AtomicBool::new(false);
    driver.run(&stop);
}

fn edit_and_persist(
    mut loaded: LoadedConfig,
    config_path: &Path,
    edit: impl FnOnce(&mut Config) -> Result<(), output_editor::OutputEditError>,
) -> Result<(), Box<dyn std::error::Error>> {
    edit(&mut loaded.config)?;
    persist_loaded_config(&loaded, config_path)?;
    print_outputs(&loaded.config);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{message}\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config_path = resolve_config_path()?;
    let loaded = load_config_file(&config_path)?;
    info!(
        "Loaded config from {} ({:?})",
        config_path.display(),
        loaded.origin
    );

    match command {
        Command::Run => run(&loaded.config),
        Command::AddOutput {
            format,
            path,
            log_mode,
        } => {
            let output = OutputConfig {
                format,
                path,
                log_mode,
            };
            edit_and_persist(loaded, &config_path, |config| {
                output_editor::add_output(config, output)
            })?;
        }
        Command::RemoveOutput(index) => {
            edit_and_persist(loaded, &config_path, |config| {
                output_editor::remove_output(config, index).map(|_| ())
            })?;
        }
        Command::ListOutputs => print_outputs(&loaded.config),
        Command::Preview(format) => preview(&loaded.config, &format),
    }

    info!("Application exiting");
    Ok(())
}
