//! # Thermoble CLI
//!
//! Command-line interface for BLE thermal receipt printers.
//!
//! ## Usage
//!
//! ```bash
//! # List nearby named BLE devices
//! thermoble scan --seconds 10
//!
//! # Print an image on a 58mm printer
//! thermoble print photo.jpg --address AA:BB:CC:DD:EE:FF
//!
//! # Print a remote image on an 80mm printer
//! thermoble print https://example.com/logo.png --address AA:BB:CC:DD:EE:FF --width 576
//!
//! # Write the command stream and a preview without a printer
//! thermoble encode photo.jpg -o job.bin --png preview.png
//! ```
//!
//! `scan` and `print` need the `ble` feature. Set `RUST_LOG` (or pass `-v`)
//! for more detail.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use thermoble::{
    PrinterConfig, ThermobleError,
    render::{EncodeOptions, RasterImage},
    source,
};

/// Thermoble - BLE thermal printer utility
#[derive(Parser, Debug)]
#[command(name = "thermoble")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List named BLE devices advertising nearby
    Scan {
        /// How long to scan
        #[arg(long, default_value = "5")]
        seconds: u64,
    },

    /// Print an image file or URL
    Print {
        /// Image path or http(s) URL
        image: String,

        /// Printer address as shown by `scan`
        #[arg(long)]
        address: String,

        /// Print width in dots (overrides the config file)
        #[arg(long)]
        width: Option<u32>,

        /// Printer config JSON file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Encode an image into printer bytes without printing
    Encode {
        /// Image path or http(s) URL
        image: String,

        /// Print width in dots
        #[arg(long, default_value = "384")]
        width: u32,

        /// Write the command stream to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Save a preview of the printed dots as PNG
        #[arg(long, value_name = "FILE")]
        png: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), ThermobleError> {
    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Scan { seconds } => runtime.block_on(scan(seconds)),

        Commands::Print {
            image,
            address,
            width,
            config,
        } => {
            let mut config = match config {
                Some(path) => PrinterConfig::load(path)?,
                None => PrinterConfig::default(),
            };
            if let Some(width) = width {
                config.width_dots = width;
            }
            config.validate()?;

            runtime.block_on(async {
                let image = source::load_image(&image).await?;
                print(image, &address, config).await
            })
        }

        Commands::Encode {
            image,
            width,
            output,
            png,
        } => {
            if output.is_none() && png.is_none() {
                return Err(ThermobleError::Config(
                    "Nothing to do: pass --output and/or --png".to_string(),
                ));
            }
            let config = PrinterConfig {
                width_dots: width,
                ..PrinterConfig::default()
            };
            config.validate()?;

            let image = runtime.block_on(source::load_image(&image))?;
            encode(&image, &config, output.as_deref(), png.as_deref())
        }
    }
}

fn encode(
    image: &DynamicImage,
    config: &PrinterConfig,
    output: Option<&Path>,
    png: Option<&Path>,
) -> Result<(), ThermobleError> {
    let raster = RasterImage::from_image(image, config.width_dots, &EncodeOptions::from(config))?;

    if let Some(path) = output {
        let data = raster.to_command();
        fs::write(path, &data)?;
        println!("Wrote {} bytes to {}", data.len(), path.display());
    }

    if let Some(path) = png {
        raster
            .to_preview()
            .save(path)
            .map_err(|e| ThermobleError::Image(format!("Failed to save PNG: {}", e)))?;
        println!(
            "Saved {}x{} preview to {}",
            config.width_dots,
            raster.height_rows(),
            path.display()
        );
    }

    Ok(())
}

#[cfg(feature = "ble")]
async fn scan(seconds: u64) -> Result<(), ThermobleError> {
    use std::time::Duration;
    use thermoble::{BleTransport, DeviceDiscoveryTracker, discovery};

    let (mut transport, mut events) = BleTransport::new().await?;
    let mut tracker = DeviceDiscoveryTracker::new();
    discovery::scan(
        &mut transport,
        &mut events,
        &mut tracker,
        Duration::from_secs(seconds),
    )
    .await?;

    if tracker.is_empty() {
        println!("No named devices found");
    }
    for device in tracker.list() {
        println!("{}  {}", device.id, device.name.as_deref().unwrap_or_default());
    }
    Ok(())
}

#[cfg(feature = "ble")]
async fn print(
    image: DynamicImage,
    address: &str,
    config: PrinterConfig,
) -> Result<(), ThermobleError> {
    use thermoble::{
        BleTransport, PrinterSession,
        session::{PrintPayload, driver},
        transport::PeripheralId,
    };

    let width_dots = config.width_dots;
    let (transport, mut events) = BleTransport::new().await?;
    let mut session = PrinterSession::new(transport, config);

    println!("Printing to {}...", address);
    let report = driver::print_and_wait(
        &mut session,
        &mut events,
        PeripheralId::from(address),
        Box::new(move |_| Ok(PrintPayload::new(width_dots, image.clone()))),
    )
    .await?;

    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
    println!(
        "Printed successfully! ({} bytes in {} chunks)",
        report.bytes, report.chunks
    );

    // The disconnect is scheduled after the drain delay; keep the runtime
    // alive until it has been sent.
    tokio::time::sleep(session.config().drain_delay()).await;
    Ok(())
}

#[cfg(not(feature = "ble"))]
async fn scan(_seconds: u64) -> Result<(), ThermobleError> {
    Err(ble_disabled())
}

#[cfg(not(feature = "ble"))]
async fn print(
    _image: DynamicImage,
    _address: &str,
    _config: PrinterConfig,
) -> Result<(), ThermobleError> {
    Err(ble_disabled())
}

#[cfg(not(feature = "ble"))]
fn ble_disabled() -> ThermobleError {
    ThermobleError::Transport("BLE support not enabled (build with --features ble)".to_string())
}
