//! Attaches to a USB/IP exporter and runs one test scenario against it.
//!
//! # Usage
//!
//! ```bash
//! # Everything, against an exporter on this machine
//! usbip-tester full
//!
//! # Only the descriptors, with transfer dumps
//! RUST_LOG=usbip_tester=debug usbip-tester --host 10.0.0.2 enumerate
//! ```

use clap::Parser;
use log::LevelFilter;
use std::time::Duration;
use usbip_tester::{scenario, ScenarioKind, TesterConfig, USBIP_PORT};

/// USB/IP client-side device tester
#[derive(Parser, Debug)]
#[command(name = "usbip-tester")]
#[command(version)]
struct Args {
   /// Scenario to run
   #[arg(value_enum, default_value = "full")]
   scenario: ScenarioKind,

   /// Exporter host
   #[arg(long, default_value = "127.0.0.1")]
   host: String,

   /// Exporter port
   #[arg(short, long, default_value_t = USBIP_PORT)]
   port: u16,

   /// Bus id of the device to import
   #[arg(short, long, default_value = "1-1")]
   bus_id: String,

   /// Interrupt IN endpoint to poll
   #[arg(long, default_value_t = 2)]
   interrupt_ep: u32,

   /// Bulk OUT endpoint to write to
   #[arg(long, default_value_t = 3)]
   bulk_out_ep: u32,

   /// Bulk IN endpoint to read the echo from
   #[arg(long, default_value_t = 4)]
   bulk_in_ep: u32,

   /// Give up on a silent exporter after this many milliseconds
   #[arg(long)]
   read_timeout_ms: Option<u64>,

   /// Log every transfer
   #[arg(short, long)]
   verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
   let args = Args::parse();

   let mut logger = pretty_env_logger::formatted_builder();
   logger.filter_level(if args.verbose {
      LevelFilter::Debug
   } else {
      LevelFilter::Info
   });
   if let Ok(filters) = std::env::var("RUST_LOG") {
      logger.parse_filters(&filters);
   }
   logger.init();

   let config = TesterConfig {
      host: args.host,
      port: args.port,
      bus_id: args.bus_id,
      interrupt_ep: args.interrupt_ep,
      bulk_out_ep: args.bulk_out_ep,
      bulk_in_ep: args.bulk_in_ep,
      read_timeout: args.read_timeout_ms.map(Duration::from_millis),
      ..TesterConfig::default()
   };

   log::info!("running {:?} against {}:{}", args.scenario, config.host, config.port);
   if let Err(err) = scenario::run(&config, args.scenario) {
      log::error!("scenario {:?} failed: {}", args.scenario, err);
      return Err(err.into());
   }

   log::info!("scenario {:?} passed", args.scenario);
   Ok(())
}
