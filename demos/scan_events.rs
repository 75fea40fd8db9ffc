//! This example listens for BLE discovery events for a few seconds.

use std::sync::Arc;

use fitble::{BtleplugCentral, DiscoveryEvent, Scanner};
use futures::StreamExt;
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    // Create a new BLE device scanner
    let central = Arc::new(BtleplugCentral::new(0).await?);
    let mut scanner = Scanner::new(central);

    // Create a stream that is provided with device events
    let mut event_stream = scanner.device_event_stream();

    // Start the scanner without a service filter
    scanner.start(None).await?;

    // Read events in a separate task
    let join_handle = tokio::spawn(async move {
        while let Some(event) = event_stream.next().await {
            match event {
                DiscoveryEvent::Discovered(device) => println!(
                    "Device discovered: {} {:?} RSSI: {:?}",
                    device.address(),
                    device.name(),
                    device.rssi()
                ),
                DiscoveryEvent::Updated(device) => {
                    println!("Device updated: {} RSSI: {:?}", device.address(), device.rssi())
                }
            }
        }
    });

    sleep(Duration::from_millis(5000)).await;

    scanner.stop_scan().await?;

    join_handle.await?;

    Ok(())
}
