use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use log::{debug, error, info};
use tokio::time::{interval, MissedTickBehavior};

use crate::kecontact::gateway::Gateway;
use crate::kecontact::sensor::Sensor;
use crate::settings::{DeviceSettings, Settings};

mod kecontact;
mod settings;

#[derive(Parser)]
#[command(name = "keba_kecontact")]
#[command(about = "Monitor and control KEBA KeContact charging stations over UDP")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Settings file path
    #[arg(short, long, default_value = "kecontact.json", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh all devices periodically and print their sensors (default)
    Monitor,
    /// Set the charging current limit of one device
    Currtime {
        /// Device name from the settings file
        #[arg(short, long)]
        device: String,
        /// Current in mA: 0 or 6000-63000
        #[arg(long)]
        current: u32,
        /// Seconds before the current applies: 0-860400
        #[arg(short, long, default_value_t = 0)]
        time: u32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(&cli.config)?;
    match cli.command.unwrap_or(Commands::Monitor) {
        Commands::Monitor => monitor(&settings).await,
        Commands::Currtime {
            device,
            current,
            time,
        } => {
            let d = settings
                .device(&device)
                .ok_or_else(|| anyhow!("no device named {}", device))?;
            let gw = connect(d).await?;
            let status = gw.set_current_limit(current, time).await?;
            gw.close().await;
            // a failed command was already logged with the device's answer
            if status.is_acknowledged() {
                info!("{}: currtime {} {} done", device, current, time);
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

async fn connect(d: &DeviceSettings) -> Result<Gateway> {
    let local = SocketAddr::from(([0, 0, 0, 0], d.local_port()));
    Ok(Gateway::connect(&d.name, &d.host, d.port, local, d.timeout()).await?)
}

async fn monitor(settings: &Settings) -> Result<ExitCode> {
    let mut devices = Vec::new();
    for d in &settings.devices {
        match connect(d).await {
            Ok(gw) => {
                let sensors: Vec<Sensor> = d
                    .sensors
                    .iter()
                    .map(|s| Sensor::new(&gw, &s.field, &s.unit))
                    .collect();
                devices.push((gw, sensors));
            }
            Err(e) => error!("{}: {:#}", d.name, e),
        }
    }
    if devices.is_empty() {
        return Err(anyhow!("no device could be reached"));
    }

    let mut tick = interval(settings.scan_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately, construction already refreshed
    tick.tick().await;

    loop {
        println!("====================");
        println!("Time: {}", Local::now());
        for (gw, sensors) in &devices {
            if let Some(t) = gw.last_refresh().await {
                println!("{}: last valid refresh {}", gw.name(), t.with_timezone(&Local));
            }
            for s in sensors {
                match s.state(gw).await {
                    Some(v) => println!("{}: {} {}", s.name, v, s.unit),
                    None => println!("{}: unavailable", s.name),
                }
            }
        }

        tick.tick().await;
        debug!("Updating...");
        for (gw, _) in &devices {
            if let Err(e) = gw.refresh().await {
                error!("{}: {:#}", gw.name(), anyhow::Error::from(e));
            }
        }
    }
}
