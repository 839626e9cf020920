//! Integration tests for the LED cycle firmware.
//!
//! Run after flashing the firmware to exercise the BLE config and user
//! services end to end.

mod ble_client;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use ble_client::BleClient;
use tests::{print_results, run_all_tests};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Integration tests for the LED cycle firmware")]
struct Args {
    /// BLE device name (or name prefix)
    #[arg(long, default_value = "LedCycle-")]
    ble_name: String,

    /// BLE scan timeout in seconds
    #[arg(long, default_value = "10")]
    scan_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("{}", "LED Cycle Integration Tests".bold());
    println!("Device: BLE (scanning for \"{}\")", args.ble_name);
    println!();

    println!("Scanning for BLE device...");
    let client =
        BleClient::connect_by_name(&args.ble_name, Duration::from_secs(args.scan_timeout)).await?;
    println!("{}", "  BLE connected!".green());

    println!("\n{}", "Running tests...".bold());
    println!();

    let results = run_all_tests(&client).await;
    print_results(&results);

    client.disconnect().await?;

    // Exit with error code if any tests failed
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
