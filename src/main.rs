// RustWorms - Ambient worm animation for LED matrices (terminal preview and WLED over DDP)

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod background;
mod config;
mod display;
mod input;
mod led_matrix;
mod population;
mod types;
mod worm;

use app::App;
use background::Background;
use config::{Args, WormsConfig};
use display::{DdpDisplay, Display, MultiDisplay, TerminalDisplay};
use input::{ButtonDevice, InputMapper, KeyboardButtons};
use led_matrix::LedMatrix;
use population::Population;

fn init_tracing(log_file: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_file.is_empty() {
        if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init() {
            eprintln!("⚠️  Logging not initialized: {}", e);
        }
        return Ok(());
    }

    // The terminal preview owns the screen, so logs go to a file
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file))?;
    let initialized = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    if let Err(e) = initialized {
        eprintln!("⚠️  Logging to {} not initialized: {}", log_file, e);
    }
    Ok(())
}

fn load_background(config: &WormsConfig) -> Result<Background> {
    match config.background_color() {
        Some(color) => Ok(Background::solid(config.width, config.height, color)),
        None => Background::load(Path::new(&config.background), config.width, config.height),
    }
}

fn build_display(config: &WormsConfig) -> Result<Box<dyn Display>> {
    let ddp = || -> Result<Box<dyn Display>> {
        let device = DdpDisplay::connect(&config.wled_ip, config.width, config.height, config.serpentine)?;
        Ok(Box::new(device))
    };

    match config.output.as_str() {
        "terminal" => Ok(Box::new(TerminalDisplay::new(config.width, config.height)?)),
        "ddp" => ddp(),
        "both" => {
            // Connect first so a bad address fails before the terminal is taken over
            let wled = ddp()?;
            let terminal: Box<dyn Display> = Box::new(TerminalDisplay::new(config.width, config.height)?);
            let multi = MultiDisplay::new(vec![wled, terminal])?;
            info!(devices = multi.device_count(), "Sending frames to several displays");
            Ok(Box::new(multi))
        }
        other => anyhow::bail!("Unknown output '{}'", other),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Get config file path (custom or default)
    let cfg_arg = args.cfg.as_deref();
    let config_path = WormsConfig::config_path(cfg_arg)?;
    let config_file_exists = config_path.exists();

    // Load existing config or create default, then merge with command line args
    let mut config = if config_file_exists {
        match WormsConfig::load_from(&config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("\n❌ Failed to load config file: {:#}", e);
                eprintln!("Config file: {}", config_path.display());
                eprintln!("\nPlease fix the config file or delete it to regenerate with defaults.");
                return Err(e);
            }
        }
    } else {
        WormsConfig {
            config_path: Some(config_path.clone()),
            ..WormsConfig::default()
        }
    };

    let args_provided = config.merge_with_args(&args);

    // Save config ONLY if it did not exist yet or command-line args changed it
    if !config_file_exists || args_provided {
        config.save()?;
    }

    println!("Using config file: {}", config_path.display());
    config.validate()?;

    init_tracing(&config.log_file)?;
    info!(
        width = config.width,
        height = config.height,
        height_adjust = config.height_adjust,
        min_worms = config.min_worms_count,
        fps = config.fps,
        output = %config.output,
        "Starting worms"
    );

    let grid = config.grid()?;
    let background = load_background(&config)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))
        .context("Failed to install Ctrl+C handler")?;

    let display = build_display(&config)?;
    let leds = LedMatrix::new(display, background, &config.matrix_settings())?;
    let buttons: Option<Box<dyn ButtonDevice>> = if args.no_input {
        None
    } else {
        Some(Box::new(KeyboardButtons::new()?))
    };

    let mut app = App::new(
        leds,
        Population::new(grid, config.min_worms_count),
        InputMapper::new(config.speed_step, config.brightness_step),
        buttons,
        config.seed,
    );

    let result = app.run(shutdown);
    let (frames, births, deaths) = (app.frames(), app.population().births(), app.population().deaths());

    // Restore the terminal before printing
    drop(app);
    result?;

    info!(frames, births, deaths, "Stopped");
    println!("\n👋 {} frames, {} worms born, {} died.", frames, births, deaths);
    Ok(())
}
