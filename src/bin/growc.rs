use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use grow_light_controller::*;
use tokio::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Key-value file holding the remembered device ID
    #[arg(long, env = "GROWLIGHT_STORE", default_value = "growlight.json", global = true)]
    store: PathBuf,

    /// How schedules are delivered
    #[arg(long, env = "GROWLIGHT_TRANSPORT", value_enum, default_value_t = TransportChoice::Auto, global = true)]
    transport: TransportChoice,

    /// Seconds to scan for the device before giving up
    #[arg(long, default_value_t = 10, global = true)]
    discovery_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum TransportChoice {
    /// Native when a device ID is stored, otherwise web
    Auto,
    /// Reconnect to the stored device and write with response
    Native,
    /// Request any device advertising the schedule service
    Web,
}

impl From<TransportChoice> for TransportPreference {
    fn from(choice: TransportChoice) -> Self {
        match choice {
            TransportChoice::Auto => TransportPreference::Auto,
            TransportChoice::Native => TransportPreference::Native,
            TransportChoice::Web => TransportPreference::Web,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Remember the device to control
    Login {
        /// Device ID or MAC address
        device_id: String,
    },
    /// Turn the grow light on
    On(LevelArgs),
    /// Turn the grow light off
    Off,
    /// Set live intensities and turn the light on
    Intensity(LevelArgs),
    /// Send a daily schedule to the device
    Schedule(ScheduleArgs),
    /// Print the schedule payload without sending it
    Payload(ScheduleArgs),
}

#[derive(Args, Debug)]
struct LevelArgs {
    /// Red light intensity (0-100)
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    red: u8,
    /// Sunlight intensity (0-100)
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    sun: u8,
}

#[derive(Args, Debug)]
struct ScheduleArgs {
    #[command(flatten)]
    levels: LevelArgs,
    /// Red light start time (HH:MM)
    #[arg(long)]
    red_start: Option<TimeOfDay>,
    /// Red light end time (HH:MM)
    #[arg(long)]
    red_end: Option<TimeOfDay>,
    /// Sunlight start time (HH:MM)
    #[arg(long)]
    sun_start: Option<TimeOfDay>,
    /// Sunlight end time (HH:MM)
    #[arg(long)]
    sun_end: Option<TimeOfDay>,
    /// Days (mon,tue,wed,thu,fri,sat,sun,all,weekdays,weekend,none)
    #[arg(short, long, default_value = "none")]
    days: DaySelection,
}

impl LevelArgs {
    fn intensities(&self) -> Result<(Intensity, Intensity)> {
        Ok((Intensity::new(self.red)?, Intensity::new(self.sun)?))
    }
}

impl ScheduleArgs {
    fn schedule(&self) -> Result<Schedule> {
        let (red, sun) = self.levels.intensities()?;
        let mut schedule = Schedule::seeded(red, sun);
        schedule.red_light.start = self.red_start;
        schedule.red_light.end = self.red_end;
        schedule.sunlight.start = self.sun_start;
        schedule.sunlight.end = self.sun_end;
        schedule.days = self.days;
        Ok(schedule)
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("grow_light_controller=info,growc=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let mut store = DeviceStore::open(&cli.store)?;
    let config = StackConfig {
        discovery_timeout: Duration::from_secs(cli.discovery_timeout),
        ..StackConfig::default()
    };

    match cli.command {
        Commands::Login { device_id } => {
            let device = store.login(&device_id)?;
            println!("Logged in to {device}");
        }
        Commands::Payload(args) => {
            println!("{}", encode(&args.schedule()?)?);
        }
        Commands::Schedule(args) => {
            let schedule = args.schedule()?;
            let stack = Arc::new(BtleplugStack::new(config).await);
            let transport = select_transport(stack, store.device_id(), cli.transport.into());

            match send_schedule(transport.as_ref(), &schedule).await {
                Ok(_) => println!("Schedule sent to BLE device ({})", transport.kind()),
                Err(e) => return Err(eyre!(e).wrap_err("Failed to send schedule")),
            }
        }
        Commands::On(levels) | Commands::Intensity(levels) => {
            let (red, sun) = levels.intensities()?;
            let mut light = connect_light(&store, config).await?;
            let result = async {
                light.set_intensity(red, sun).await?;
                if !light.is_on {
                    light.power_on().await?;
                }
                Ok::<(), Error>(())
            }
            .await;
            finish_light(light, result).await?;
        }
        Commands::Off => {
            let mut light = connect_light(&store, config).await?;
            let result = light.power_off().await;
            finish_light(light, result).await?;
        }
    }

    Ok(())
}

/// Disconnects whatever the outcome of the command, reporting the command's error first
async fn finish_light(light: GrowLight, result: grow_light_controller::Result<()>) -> Result<()> {
    let closed = light.disconnect().await;
    result?;
    closed?;
    Ok(())
}

/// Connects live control to the device remembered at login
#[instrument(skip(store))]
async fn connect_light(store: &DeviceStore, config: StackConfig) -> Result<GrowLight> {
    let device = store.device_id().ok_or(Error::NoDeviceConnected)?;
    let stack = BtleplugStack::new(config).await;
    if !stack.is_available().await {
        return Err(Error::UnsupportedPlatform.into());
    }

    match GrowLight::connect(&stack, &device).await {
        Ok(light) => {
            info!("Connected to {}", device);
            Ok(light)
        }
        Err(e) => {
            error!("Failed to connect to device: {}", e);
            Err(e.into())
        }
    }
}
