//! This example finds the first BLE device that advertises the heart rate service,
//! connects to it and prints heart rate values until the link drops.

use std::sync::Arc;

use fitble::{
    BtleplugCentral, FirstMatch, Lifecycle, Measurement, ServiceProfile, Supervisor,
    SupervisorConfig, TelemetryEvent,
};
use futures::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let central = Arc::new(BtleplugCentral::new(0).await?);
    let supervisor = Supervisor::new(central, FirstMatch::any(), SupervisorConfig::default());
    let mut events = supervisor.events();

    let Some(session) = supervisor.connect(ServiceProfile::HeartRate).await? else {
        println!("No heart rate monitor found");
        return Ok(());
    };

    println!(
        "Streaming from {}",
        session.peripheral().name().unwrap_or("unknown sensor")
    );

    while let Some(event) = events.next().await {
        match event {
            TelemetryEvent::Measurement(Measurement::HeartRate { bpm }) => {
                println!("{} bpm", bpm)
            }
            TelemetryEvent::Lifecycle(Lifecycle::Disconnected) => {
                println!("Sensor disconnected");
                break;
            }
            TelemetryEvent::Lifecycle(Lifecycle::Failed(e)) => {
                println!("Session failed: {}", e);
                break;
            }
            other => println!("{:?}", other),
        }
    }

    supervisor.disconnect().await?;

    Ok(())
}
