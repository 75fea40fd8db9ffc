pub mod services {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    pub const HEART_RATE: Uuid = uuid_from_u16(0x180D);
    pub const RUNNING_SPEED_CADENCE: Uuid = uuid_from_u16(0x1814);
    pub const USER_DATA: Uuid = uuid_from_u16(0x181C);
    pub const FITNESS_MACHINE: Uuid = uuid_from_u16(0x1826);
    pub const DEVICE_INFORMATION: Uuid = uuid_from_u16(0x180A);
    pub const BATTERY: Uuid = uuid_from_u16(0x180F);
}

pub mod characteristics {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    pub const HEART_RATE_MEASUREMENT: Uuid = uuid_from_u16(0x2A37);
    pub const BATTERY_LEVEL: Uuid = uuid_from_u16(0x2A19);

    pub const RSC_MEASUREMENT: Uuid = uuid_from_u16(0x2A53);
    pub const RSC_FEATURE: Uuid = uuid_from_u16(0x2A54);

    pub const AGE: Uuid = uuid_from_u16(0x2A80);
    pub const GENDER: Uuid = uuid_from_u16(0x2A8C);
    pub const WEIGHT: Uuid = uuid_from_u16(0x2A98);

    pub const FITNESS_MACHINE_FEATURE: Uuid = uuid_from_u16(0x2ACC);
    pub const TREADMILL_DATA: Uuid = uuid_from_u16(0x2ACD);
    pub const TRAINING_STATUS: Uuid = uuid_from_u16(0x2AD3);
    pub const SUPPORTED_SPEED_RANGE: Uuid = uuid_from_u16(0x2AD4);
    pub const SUPPORTED_INCLINATION_RANGE: Uuid = uuid_from_u16(0x2AD5);
    pub const FITNESS_MACHINE_CONTROL_POINT: Uuid = uuid_from_u16(0x2AD9);
    pub const FITNESS_MACHINE_STATUS: Uuid = uuid_from_u16(0x2ADA);

    pub const SYSTEM_ID: Uuid = uuid_from_u16(0x2A23);
    pub const MODEL_NUMBER: Uuid = uuid_from_u16(0x2A24);
    pub const SERIAL_NUMBER: Uuid = uuid_from_u16(0x2A25);
    pub const FIRMWARE_REVISION: Uuid = uuid_from_u16(0x2A26);
    pub const HARDWARE_REVISION: Uuid = uuid_from_u16(0x2A27);
    pub const SOFTWARE_REVISION: Uuid = uuid_from_u16(0x2A28);
    pub const MANUFACTURER_NAME: Uuid = uuid_from_u16(0x2A29);
}
