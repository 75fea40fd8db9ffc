//! This example picks the first heart rate monitor whose name starts with the given
//! prefix, reads its Device Information service and prints the values.

use std::sync::Arc;

use fitble::{BtleplugCentral, FirstMatch, Measurement, ServiceProfile, Supervisor, SupervisorConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let prefix = std::env::args().nth(1).unwrap_or_else(|| "Polar H10".to_string());

    let central = Arc::new(BtleplugCentral::new(0).await?);
    let supervisor = Supervisor::new(
        central,
        FirstMatch::name_prefix(prefix),
        SupervisorConfig::default(),
    );

    let inspected = supervisor
        .inspect(ServiceProfile::HeartRate, ServiceProfile::DeviceInformation)
        .await?;
    let Some((device, readings)) = inspected else {
        println!("No matching device found");
        return Ok(());
    };

    println!("Sensor: {}", device.name().unwrap_or("unknown"));
    for reading in readings {
        match reading.value {
            Ok(Measurement::DeviceInfo { field, value }) => println!("  {}: {}", field, value),
            Ok(other) => println!("  {}: {:?}", reading.characteristic, other),
            Err(e) => println!("  {}: {}", reading.characteristic, e),
        }
    }

    Ok(())
}
