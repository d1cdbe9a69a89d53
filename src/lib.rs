/*!
 # Grow Light Bluetooth Controller Library

 A Rust library for scheduling and controlling Bluetooth LE grow lights with
 a red light channel and a sunlight channel.

 ## Features

 * Device login with a persisted device identifier
 * Live power and intensity control
 * Per-channel daily schedules with weekday selection
 * JSON schedule payloads with clock and timezone metadata
 * Native (addressed) and web-style (service filtered) schedule delivery

 ## Example

 ```no_run
 use grow_light_controller::*;
 use std::sync::Arc;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     let mut store = DeviceStore::open("growlight.json")?;
     let device = store.login("AA:BB:CC:DD:EE:FF")?;

     let stack = Arc::new(BtleplugStack::new(StackConfig::default()).await);
     let transport = select_transport(stack, Some(device), TransportPreference::Auto);

     let mut schedule = Schedule::seeded(Intensity::saturating(40), Intensity::MIN);
     schedule.days = "mon,wed".parse()?;

     send_schedule(transport.as_ref(), &schedule).await?;
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the grow light controller library
#[derive(Error, Debug)]
pub enum Error {
    /// No device reference was captured at login
    #[error("No BLE device connected")]
    NoDeviceConnected,

    /// Bluetooth is not available in this runtime
    #[error("Bluetooth is not supported on this platform")]
    UnsupportedPlatform,

    /// Connecting to the device or discovering its services failed
    #[error("Failed to connect to the device: {0}")]
    ConnectionFailure(String),

    /// The characteristic write was rejected
    #[error("Failed to send to the device: {0}")]
    TransmissionFailure(String),

    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,

    /// Failed to find required BLE characteristic
    #[error("Could not find required BLE characteristic: {0}")]
    CharacteristicNotFound(String),

    /// Value out of range
    #[error("Value {0} out of range ({1}..{2})")]
    ValueOutOfRange(u32, u32, u32),

    /// Time of day not in HH:MM form
    #[error("Invalid time of day: {0:?} (expected HH:MM)")]
    InvalidTime(String),

    /// Unrecognised weekday name
    #[error("Invalid day selection: {0:?}")]
    InvalidDays(String),

    /// Blank device identifier at login
    #[error("Please enter a valid device ID")]
    InvalidDeviceId,

    /// Payload does not match the wire schema
    #[error("Payload schema mismatch: {0}")]
    Schema(String),

    /// JSON encoding or decoding failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Filesystem or stdio failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from btleplug
    #[error(transparent)]
    BtlePlugError(#[from] btleplug::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod ble;
pub mod device;
pub mod payload;
pub mod schedule;
pub mod store;
pub mod transport;

// Re-export key types
pub use ble::{BtleplugStack, StackConfig};
pub use device::{GrowLight, LiveCommand, LIVE_CHARACTERISTIC_UUID, LIVE_SERVICE_UUID};
pub use payload::{decode, encode, to_base64, ClockSnapshot, SchedulePayload, PAYLOAD_FIELDS};
pub use schedule::{Channel, DaySelection, Intensity, Schedule, ScheduleEntry, TimeOfDay, WEEK_DAYS};
pub use store::{DeviceRef, DeviceStore, DEVICE_ID_KEY};
pub use transport::{
    select_transport, send_schedule, BleStack, GattLink, NativeTransport, ScheduleTransport,
    SendAttempt, SendState, TransportKind, TransportPreference, WebTransport, WriteMode,
    SCHEDULE_CHARACTERISTIC_UUID, SCHEDULE_SERVICE_UUID,
};
