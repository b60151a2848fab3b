use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use dfu_core::dfu::{DfuOrchestrator, UpdateConfig};
use dfu_core::image::{FirmwareImage, ImageType};
use dfu_core::peripheral::DeviceEmulator;
use dfu_core::plan::plan;
use dfu_core::protocol::SelectResponse;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Nordic Secure DFU Tool (Pure Rust)", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full update against the in-memory device emulator.
    Simulate {
        /// Path to the init packet (.dat)
        #[arg(long)]
        init_packet: String,

        /// Path to the firmware image (.bin)
        #[arg(long)]
        firmware: String,

        /// Image role: softdevice, bootloader, softdevice+bootloader, application
        #[arg(long, default_value = "application")]
        image_type: String,

        /// Optional TOML config file (mtu, prn, request_timeout_ms)
        #[arg(long)]
        config: Option<String>,

        /// Emulated max object size for the firmware
        #[arg(long, default_value_t = 4096)]
        max_object_size: u32,
    },
    /// Show how a firmware payload would be chunked against a device's
    /// reported resume state.
    Plan {
        /// Path to the firmware image (.bin)
        #[arg(long)]
        firmware: String,

        /// Negotiated max object size
        #[arg(long)]
        max_size: u32,

        /// Device-reported offset
        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Device-reported CRC-32 (hex accepted with 0x prefix)
        #[arg(long, default_value = "0")]
        crc32: String,
    },
}

fn parse_image_type(name: &str) -> Result<ImageType> {
    Ok(match name {
        "softdevice" => ImageType::SoftDevice,
        "bootloader" => ImageType::Bootloader,
        "softdevice+bootloader" => ImageType::SoftDeviceBootloader,
        "application" => ImageType::Application,
        other => bail!("unknown image type: {other}"),
    })
}

fn parse_u32(value: &str) -> Result<u32> {
    Ok(match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => value.parse()?,
    })
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Simulate {
            init_packet,
            firmware,
            image_type,
            config,
            max_object_size,
        } => {
            let image_type = parse_image_type(&image_type)?;
            let config = match config {
                Some(path) => UpdateConfig::load_from_file(path)?,
                None => UpdateConfig::default(),
            };
            info!(%image_type, "loading image files");
            let image = FirmwareImage::from_files(image_type, &init_packet, &firmware)?;

            let target = DeviceEmulator::new(512, max_object_size);
            let orchestrator = DfuOrchestrator::new(config, vec![image]);
            orchestrator.run(&target)?;
            info!("simulated update finished");
        }
        Command::Plan {
            firmware,
            max_size,
            offset,
            crc32,
        } => {
            let payload = std::fs::read(&firmware)?;
            let select = SelectResponse {
                max_size,
                offset,
                crc32: parse_u32(&crc32)?,
            };
            let plan = plan(&payload, &select)?;
            println!(
                "resume offset: {} (crc32 0x{:08X})",
                plan.offset, plan.crc32
            );
            println!("partial object: {} bytes", plan.partial_object.len());
            println!(
                "fresh objects: {} ({} bytes total)",
                plan.objects.len(),
                plan.objects.iter().map(Vec::len).sum::<usize>()
            );
            println!("bytes to send: {}", plan.bytes_to_send());
        }
    }
    Ok(())
}
