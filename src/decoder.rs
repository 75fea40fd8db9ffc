//! Decoders turning raw characteristic payloads into typed measurements.

use std::fmt;

use uuid::Uuid;

use crate::common::characteristics as chars;
use crate::{DecodeError, ServiceProfile};

/// Pace reported when the runner is standing still, in min/km.
pub const ZERO_SPEED_PACE_MIN_PER_KM: f64 = 50.0;

const HR_VALUE_FORMAT_U16: u8 = 1 << 0;

const RSC_STRIDE_LENGTH_PRESENT: u8 = 1 << 0;
const RSC_TOTAL_DISTANCE_PRESENT: u8 = 1 << 1;
const RSC_RUNNING: u8 = 1 << 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    HeartRate { bpm: u16 },
    RunningSpeedCadence(RscMeasurement),
    UserAge { years: u32 },
    /// Any gender byte other than `0x00` decodes as `male: false`.
    UserGender { male: bool },
    UserWeight { kg: f64 },
    BatteryLevel { percent: u8 },
    DeviceInfo { field: DeviceInfoField, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RscMeasurement {
    pub speed_m_s: f64,
    pub cadence_spm: u8,
    pub running: bool,
    pub stride_length_m: Option<f64>,
    pub total_distance_m: Option<f64>,
}

impl RscMeasurement {
    pub fn speed_kmh(&self) -> f64 {
        self.speed_m_s * 3.6
    }

    pub fn pace_min_per_km(&self) -> f64 {
        let kmh = self.speed_kmh();
        if kmh > 0.0 {
            60.0 / kmh
        } else {
            ZERO_SPEED_PACE_MIN_PER_KM
        }
    }

    pub fn total_distance_km(&self) -> Option<f64> {
        self.total_distance_m.map(|m| m / 1000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceInfoField {
    ManufacturerName,
    ModelNumber,
    SerialNumber,
    HardwareRevision,
    FirmwareRevision,
    SoftwareRevision,
    SystemId,
}

impl DeviceInfoField {
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        let field = match uuid {
            chars::MANUFACTURER_NAME => DeviceInfoField::ManufacturerName,
            chars::MODEL_NUMBER => DeviceInfoField::ModelNumber,
            chars::SERIAL_NUMBER => DeviceInfoField::SerialNumber,
            chars::HARDWARE_REVISION => DeviceInfoField::HardwareRevision,
            chars::FIRMWARE_REVISION => DeviceInfoField::FirmwareRevision,
            chars::SOFTWARE_REVISION => DeviceInfoField::SoftwareRevision,
            chars::SYSTEM_ID => DeviceInfoField::SystemId,
            _ => return None,
        };
        Some(field)
    }
}

impl fmt::Display for DeviceInfoField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceInfoField::ManufacturerName => "Manufacturer Name",
            DeviceInfoField::ModelNumber => "Model Number",
            DeviceInfoField::SerialNumber => "Serial Number",
            DeviceInfoField::HardwareRevision => "Hardware Revision",
            DeviceInfoField::FirmwareRevision => "Firmware Revision",
            DeviceInfoField::SoftwareRevision => "Software Revision",
            DeviceInfoField::SystemId => "System ID",
        };
        f.write_str(name)
    }
}

/// Decodes a payload received from `characteristic` under `profile`.
pub fn decode(
    profile: ServiceProfile,
    characteristic: Uuid,
    bytes: &[u8],
) -> Result<Measurement, DecodeError> {
    if !profile.accepts(characteristic) {
        return Err(DecodeError::UnknownCharacteristic {
            profile,
            characteristic,
        });
    }

    match characteristic {
        chars::HEART_RATE_MEASUREMENT => decode_heart_rate(bytes),
        chars::RSC_MEASUREMENT => decode_rsc(bytes).map(Measurement::RunningSpeedCadence),
        chars::AGE => {
            let years = le_unsigned(bytes, 4)? as u32;
            Ok(Measurement::UserAge { years })
        }
        chars::GENDER => {
            require(bytes, 1)?;
            Ok(Measurement::UserGender {
                male: bytes == [0x00],
            })
        }
        chars::WEIGHT => {
            let raw = le_unsigned(bytes, 8)?;
            Ok(Measurement::UserWeight {
                kg: raw as f64 / 200.0,
            })
        }
        chars::BATTERY_LEVEL => {
            require(bytes, 1)?;
            Ok(Measurement::BatteryLevel { percent: bytes[0] })
        }
        other => match DeviceInfoField::from_uuid(other) {
            Some(field) => Ok(decode_device_info(field, bytes)),
            None => Err(DecodeError::UnknownCharacteristic {
                profile,
                characteristic,
            }),
        },
    }
}

fn decode_heart_rate(bytes: &[u8]) -> Result<Measurement, DecodeError> {
    require(bytes, 1)?;
    let flags = bytes[0];

    let bpm = if flags & HR_VALUE_FORMAT_U16 != 0 {
        require(bytes, 3)?;
        u16::from_le_bytes([bytes[1], bytes[2]])
    } else {
        require(bytes, 2)?;
        u16::from(bytes[1])
    };

    Ok(Measurement::HeartRate { bpm })
}

fn decode_rsc(bytes: &[u8]) -> Result<RscMeasurement, DecodeError> {
    require(bytes, 4)?;
    let flags = bytes[0];

    let speed_m_s = f64::from(u16::from_le_bytes([bytes[1], bytes[2]])) / 256.0;
    let cadence_spm = bytes[3];

    let mut offset = 4;

    let stride_length_m = if flags & RSC_STRIDE_LENGTH_PRESENT != 0 {
        require(bytes, offset + 2)?;
        let raw = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        offset += 2;
        Some(f64::from(raw) * 0.01)
    } else {
        None
    };

    let total_distance_m = if flags & RSC_TOTAL_DISTANCE_PRESENT != 0 {
        require(bytes, offset + 4)?;
        let mut raw = [0; 4];
        raw.copy_from_slice(&bytes[offset..offset + 4]);
        Some(f64::from(u32::from_le_bytes(raw)) * 0.01)
    } else {
        None
    };

    Ok(RscMeasurement {
        speed_m_s,
        cadence_spm,
        running: flags & RSC_RUNNING != 0,
        stride_length_m,
        total_distance_m,
    })
}

fn decode_device_info(field: DeviceInfoField, bytes: &[u8]) -> Measurement {
    let value = match field {
        DeviceInfoField::SystemId => bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join("-"),
        _ => String::from_utf8_lossy(bytes)
            .chars()
            .filter(|c| c.is_ascii_graphic() || c.is_ascii_whitespace() || *c == '\x0b')
            .collect(),
    };

    Measurement::DeviceInfo { field, value }
}

fn require(bytes: &[u8], expected: usize) -> Result<(), DecodeError> {
    if bytes.len() < expected {
        Err(DecodeError::TooShort {
            expected,
            actual: bytes.len(),
        })
    } else {
        Ok(())
    }
}

/// Little-endian unsigned integer spanning the whole payload.
fn le_unsigned(bytes: &[u8], max: usize) -> Result<u64, DecodeError> {
    require(bytes, 1)?;
    if bytes.len() > max {
        return Err(DecodeError::TooLong {
            max,
            actual: bytes.len(),
        });
    }

    Ok(bytes
        .iter()
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}
