use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::Receiver;
use serde::Serialize;
use which_usb::config::Config;
use which_usb::{
    CommandEnumerator, CommandInspector, DeviceRecord, DeviceSource, InspectionReport, Workflow,
    WorkflowEvent, WorkflowState, tui,
};

/// Which USB? - find out which device table entry is the device in your hand
#[derive(Parser, Debug)]
#[command(name = "which-usb", version, about, long_about = None)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the devices the enumeration command reports right now
    Scan {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run one identification flow on the console
    Identify {
        /// Whether the device is plugged in right now
        #[arg(value_enum)]
        flow: Flow,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive terminal interface (default)
    Tui,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Flow {
    /// The device is connected and will be unplugged
    Connected,
    /// The device is not connected and will be plugged in
    NotConnected,
}

#[derive(Serialize)]
struct IdentifyResult<'a> {
    identified: Option<&'a DeviceRecord>,
    report: Option<&'a str>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let is_tui = matches!(args.command, None | Some(Commands::Tui));
    init_logging(args.verbose, is_tui);

    let config = Config::load_or_default(args.config.as_deref())?;
    log::debug!("using config {:?}", config);

    match args.command {
        Some(Commands::Scan { json }) => scan(&config, json),
        Some(Commands::Identify { flow, json }) => identify(config, flow, json),
        None | Some(Commands::Tui) => run_tui(config),
    }
}

fn init_logging(verbose: bool, is_tui: bool) {
    // Log lines would tear the TUI apart, so it stays quiet unless RUST_LOG asks.
    let default = match (verbose, is_tui) {
        (true, _) => "debug",
        (false, true) => "off",
        (false, false) => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn scan(config: &Config, json: bool) -> Result<()> {
    let source = CommandEnumerator::from_settings(&config.enumeration);
    let devices = source.capture();

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!(
        "{:<5} | {:<6} | {:<6} | {:<7} | Description",
        "Bus", "Device", "Vendor", "Product"
    );
    println!("{}", "-".repeat(72));
    for dev in devices.iter() {
        println!(
            "{:<5} | {:<6} | {:<6} | {:<7} | {}",
            dev.bus, dev.device_number, dev.vendor_id, dev.product_id, dev.description
        );
    }

    Ok(())
}

fn spawn_workflow(config: Config) -> (Workflow, Receiver<WorkflowEvent>) {
    let source = Arc::new(CommandEnumerator::from_settings(&config.enumeration));
    let inspector = Arc::new(CommandInspector::new(config.inspection));
    Workflow::spawn(source, inspector, config.workflow)
}

fn identify(mut config: Config, flow: Flow, json: bool) -> Result<()> {
    // The startup animation only makes sense in the TUI.
    config.workflow.startup_ms = 0;
    let (workflow, events) = spawn_workflow(config);

    match flow {
        Flow::Connected => workflow.start_connected_flow(),
        Flow::NotConnected => workflow.start_not_connected_flow(),
    }

    let mut identified: Option<DeviceRecord> = None;
    let mut report: Option<InspectionReport> = None;

    for event in events.iter() {
        match event {
            WorkflowEvent::StatusChanged(message) => {
                if !json {
                    println!("{}", message);
                }
            }
            WorkflowEvent::CountdownTick(seconds) => {
                if !json {
                    println!("  {}...", seconds);
                }
            }
            WorkflowEvent::DeviceIdentified(dev) => identified = Some(dev),
            WorkflowEvent::InspectionComplete(r) => report = Some(r),
            WorkflowEvent::StateChanged(WorkflowState::Succeeded(_)) => break,
            _ => {}
        }
    }
    workflow.shutdown();

    if json {
        let result = IdentifyResult {
            identified: identified.as_ref(),
            report: report.as_ref().map(InspectionReport::text),
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if let Some(dev) = &identified {
        println!();
        println!("Identified: {}", dev);
    }
    if let Some(report) = &report {
        println!();
        println!("{}", report);
    }

    Ok(())
}

fn run_tui(config: Config) -> Result<()> {
    let (workflow, events) = spawn_workflow(config);
    let result = tui::run(&workflow, &events);
    workflow.shutdown();
    result
}
