use std::fmt;

use uuid::Uuid;

use crate::common::{characteristics as chars, services};

/// The BLE profiles this crate knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceProfile {
    HeartRate,
    RunningSpeedCadence,
    UserData,
    FitnessMachine,
    DeviceInformation,
    Battery,
}

const HEART_RATE: &[Uuid] = &[chars::HEART_RATE_MEASUREMENT];

const RUNNING_SPEED_CADENCE: &[Uuid] = &[chars::RSC_MEASUREMENT, chars::RSC_FEATURE];

const USER_DATA: &[Uuid] = &[chars::AGE, chars::GENDER, chars::WEIGHT];

const FITNESS_MACHINE: &[Uuid] = &[
    chars::FITNESS_MACHINE_FEATURE,
    chars::TREADMILL_DATA,
    chars::TRAINING_STATUS,
    chars::SUPPORTED_SPEED_RANGE,
    chars::SUPPORTED_INCLINATION_RANGE,
    chars::FITNESS_MACHINE_CONTROL_POINT,
    chars::FITNESS_MACHINE_STATUS,
];

// Treadmills expose running speed and the user's profile next to the
// fitness machine service.
const FITNESS_MACHINE_COMPANIONS: &[Uuid] = &[
    chars::RSC_MEASUREMENT,
    chars::AGE,
    chars::GENDER,
    chars::WEIGHT,
];

const DEVICE_INFORMATION: &[Uuid] = &[
    chars::MANUFACTURER_NAME,
    chars::MODEL_NUMBER,
    chars::SERIAL_NUMBER,
    chars::HARDWARE_REVISION,
    chars::FIRMWARE_REVISION,
    chars::SOFTWARE_REVISION,
    chars::SYSTEM_ID,
];

const BATTERY: &[Uuid] = &[chars::BATTERY_LEVEL];

impl ServiceProfile {
    pub const ALL: [ServiceProfile; 6] = [
        ServiceProfile::HeartRate,
        ServiceProfile::RunningSpeedCadence,
        ServiceProfile::UserData,
        ServiceProfile::FitnessMachine,
        ServiceProfile::DeviceInformation,
        ServiceProfile::Battery,
    ];

    /// Canonical service UUID, used as the scan filter.
    pub fn service_uuid(self) -> Uuid {
        match self {
            ServiceProfile::HeartRate => services::HEART_RATE,
            ServiceProfile::RunningSpeedCadence => services::RUNNING_SPEED_CADENCE,
            ServiceProfile::UserData => services::USER_DATA,
            ServiceProfile::FitnessMachine => services::FITNESS_MACHINE,
            ServiceProfile::DeviceInformation => services::DEVICE_INFORMATION,
            ServiceProfile::Battery => services::BATTERY,
        }
    }

    /// Characteristics the profile's service defines.
    pub fn characteristics(self) -> &'static [Uuid] {
        match self {
            ServiceProfile::HeartRate => HEART_RATE,
            ServiceProfile::RunningSpeedCadence => RUNNING_SPEED_CADENCE,
            ServiceProfile::UserData => USER_DATA,
            ServiceProfile::FitnessMachine => FITNESS_MACHINE,
            ServiceProfile::DeviceInformation => DEVICE_INFORMATION,
            ServiceProfile::Battery => BATTERY,
        }
    }

    /// Whether a payload from `characteristic` may be decoded under this profile.
    pub fn accepts(self, characteristic: Uuid) -> bool {
        self.characteristics().contains(&characteristic)
            || (self == ServiceProfile::FitnessMachine
                && FITNESS_MACHINE_COMPANIONS.contains(&characteristic))
    }

    /// The notify characteristic a telemetry session subscribes to.
    pub fn default_measurement(self) -> Option<Uuid> {
        match self {
            ServiceProfile::HeartRate => Some(chars::HEART_RATE_MEASUREMENT),
            ServiceProfile::RunningSpeedCadence | ServiceProfile::FitnessMachine => {
                Some(chars::RSC_MEASUREMENT)
            }
            ServiceProfile::Battery => Some(chars::BATTERY_LEVEL),
            ServiceProfile::UserData | ServiceProfile::DeviceInformation => None,
        }
    }

    /// Characteristics worth reading once when inspecting a device.
    pub fn readable(self) -> &'static [Uuid] {
        match self {
            ServiceProfile::UserData | ServiceProfile::FitnessMachine => USER_DATA,
            ServiceProfile::DeviceInformation => DEVICE_INFORMATION,
            ServiceProfile::Battery => BATTERY,
            ServiceProfile::HeartRate | ServiceProfile::RunningSpeedCadence => &[],
        }
    }

    /// Looks up the profile advertising `service`.
    pub fn from_service_uuid(service: Uuid) -> Option<ServiceProfile> {
        Self::ALL.into_iter().find(|p| p.service_uuid() == service)
    }
}

impl fmt::Display for ServiceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceProfile::HeartRate => "Heart Rate",
            ServiceProfile::RunningSpeedCadence => "Running Speed and Cadence",
            ServiceProfile::UserData => "User Data",
            ServiceProfile::FitnessMachine => "Fitness Machine",
            ServiceProfile::DeviceInformation => "Device Information",
            ServiceProfile::Battery => "Battery",
        };
        f.write_str(name)
    }
}
