use uuid::Uuid;

use crate::central::BleCentral;
use crate::{decode, DecodeError, Error, Measurement, PeripheralRef, Result, ServiceProfile};

/// Outcome of reading one characteristic once.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicReading {
    pub characteristic: Uuid,
    pub value: std::result::Result<Measurement, DecodeError>,
}

/// Connects, reads each of `characteristics` once, and disconnects.
///
/// The link is closed whether or not the reads succeed.
pub async fn read_characteristics<C: BleCentral>(
    central: &C,
    peripheral: &PeripheralRef,
    profile: ServiceProfile,
    characteristics: &[Uuid],
) -> Result<Vec<CharacteristicReading>> {
    let link = central
        .connect(peripheral)
        .await
        .map_err(|source| Error::Connect {
            address: peripheral.address(),
            source,
        })?;

    let readings = read_all(central, &link, profile, characteristics).await;

    if let Err(e) = central.disconnect(&link).await {
        log::warn!("Disconnecting from {} failed: {}", peripheral.address(), e);
    }

    readings
}

async fn read_all<C: BleCentral>(
    central: &C,
    link: &C::Link,
    profile: ServiceProfile,
    characteristics: &[Uuid],
) -> Result<Vec<CharacteristicReading>> {
    let mut readings = Vec::with_capacity(characteristics.len());

    for &characteristic in characteristics {
        let bytes = central
            .read(link, characteristic)
            .await
            .map_err(|source| Error::Read {
                characteristic,
                source,
            })?;
        log::debug!("Read {}: {:02x?}", characteristic, bytes);

        readings.push(CharacteristicReading {
            characteristic,
            value: decode(profile, characteristic, &bytes),
        });
    }

    Ok(readings)
}
