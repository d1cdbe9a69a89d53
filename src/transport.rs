/*!
 # Schedule delivery over BLE

 Two ways of getting a payload onto the grow light:

 * [`NativeTransport`] reconnects to the device remembered at login,
   discovers its services and writes the base64 payload with a response.
 * [`WebTransport`] follows the Web Bluetooth flow: request any device
   advertising the schedule service, then write the raw UTF-8 payload
   without a response.

 Both run on a [`BleStack`], so the radio can be swapped for the btleplug
 stack or a test double. [`select_transport`] picks one at startup.
*/

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::bleuuid::uuid_from_u16;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::payload::{encode, to_base64};
use crate::schedule::Schedule;
use crate::store::DeviceRef;
use crate::{Error, Result};

/// Schedule service (`B00B`)
pub const SCHEDULE_SERVICE_UUID: Uuid = uuid_from_u16(0xB00B);
/// Schedule characteristic (`FEED`)
pub const SCHEDULE_CHARACTERISTIC_UUID: Uuid = uuid_from_u16(0xFEED);

/// Whether the stack should ask the device to acknowledge a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// Platform Bluetooth stack
#[async_trait]
pub trait BleStack: Send + Sync {
    /// Whether Bluetooth can be used at all in this runtime
    async fn is_available(&self) -> bool;

    /// Connects to a device remembered by identifier
    async fn connect(&self, device_id: &str) -> Result<Box<dyn GattLink>>;

    /// Connects to the first device advertising `service`
    async fn request_device(&self, service: Uuid) -> Result<Box<dyn GattLink>>;
}

/// An open GATT connection
#[async_trait]
pub trait GattLink: Send {
    /// Discovers all services and characteristics
    async fn discover(&mut self) -> Result<()>;

    async fn write(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;
}

/// Stage of a single send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Connecting,
    Discovering,
    Writing,
    Success,
    Failed,
}

impl SendState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SendState::Success | SendState::Failed)
    }
}

/// History of one send attempt, from `Idle` to `Success` or `Failed`
#[derive(Debug, Clone)]
pub struct SendAttempt {
    history: Vec<SendState>,
}

impl Default for SendAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl SendAttempt {
    pub fn new() -> Self {
        Self {
            history: vec![SendState::Idle],
        }
    }

    pub fn state(&self) -> SendState {
        // history always starts with Idle
        self.history.last().copied().unwrap_or(SendState::Idle)
    }

    pub fn history(&self) -> &[SendState] {
        &self.history
    }

    /// Moves to `next`; terminal attempts stay where they are
    pub fn advance(&mut self, next: SendState) {
        let current = self.state();
        if current.is_terminal() {
            warn!("Ignoring {:?} after terminal state {:?}", next, current);
            return;
        }
        debug!("Send attempt {:?} -> {:?}", current, next);
        self.history.push(next);
    }

    /// Records the outcome of `result` as the terminal state
    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.advance(SendState::Success),
            Err(_) => self.advance(SendState::Failed),
        }
        result
    }
}

/// Which delivery mechanism a transport uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Native,
    Web,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Native => write!(f, "native"),
            TransportKind::Web => write!(f, "web"),
        }
    }
}

/// Delivers an encoded schedule payload to the device
#[async_trait]
pub trait ScheduleTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Capability check, evaluated again on every send
    async fn is_supported(&self) -> bool;

    /// Sends `payload`, recording each stage in `attempt`
    async fn send(&self, payload: &str, attempt: &mut SendAttempt) -> Result<()>;
}

/// Disconnect errors are only logged; the send outcome is already decided
async fn close_link(link: &mut dyn GattLink) {
    if let Err(e) = link.disconnect().await {
        warn!("Failed to disconnect: {}", e);
    }
}

fn connection_failure(e: Error) -> Error {
    match e {
        Error::ConnectionFailure(_) => e,
        other => Error::ConnectionFailure(other.to_string()),
    }
}

fn transmission_failure(e: Error) -> Error {
    match e {
        Error::TransmissionFailure(_) => e,
        other => Error::TransmissionFailure(other.to_string()),
    }
}

/// Writes to the device remembered at login
pub struct NativeTransport {
    stack: Arc<dyn BleStack>,
    device: Option<DeviceRef>,
}

impl NativeTransport {
    pub fn new(stack: Arc<dyn BleStack>, device: Option<DeviceRef>) -> Self {
        Self { stack, device }
    }

    pub fn device(&self) -> Option<&DeviceRef> {
        self.device.as_ref()
    }
}

#[async_trait]
impl ScheduleTransport for NativeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Native
    }

    async fn is_supported(&self) -> bool {
        self.stack.is_available().await
    }

    #[instrument(skip(self, payload, attempt), fields(len = payload.len()))]
    async fn send(&self, payload: &str, attempt: &mut SendAttempt) -> Result<()> {
        let result = self.deliver(payload, attempt).await;
        attempt.finish(result)
    }
}

impl NativeTransport {
    async fn deliver(&self, payload: &str, attempt: &mut SendAttempt) -> Result<()> {
        let device = self.device.as_ref().ok_or(Error::NoDeviceConnected)?;
        if !self.is_supported().await {
            return Err(Error::UnsupportedPlatform);
        }

        attempt.advance(SendState::Connecting);
        info!("Connecting to {}", device);
        let mut link = self
            .stack
            .connect(device.id())
            .await
            .map_err(connection_failure)?;

        let written = Self::discover_and_write(link.as_mut(), payload, attempt).await;
        close_link(link.as_mut()).await;
        written
    }

    async fn discover_and_write(
        link: &mut dyn GattLink,
        payload: &str,
        attempt: &mut SendAttempt,
    ) -> Result<()> {
        attempt.advance(SendState::Discovering);
        link.discover().await.map_err(connection_failure)?;

        attempt.advance(SendState::Writing);
        let encoded = to_base64(payload);
        link.write(
            SCHEDULE_SERVICE_UUID,
            SCHEDULE_CHARACTERISTIC_UUID,
            encoded.as_bytes(),
            WriteMode::WithResponse,
        )
        .await
        .map_err(transmission_failure)
    }
}

/// Requests a device by service filter and writes the raw payload
pub struct WebTransport {
    stack: Arc<dyn BleStack>,
}

impl WebTransport {
    pub fn new(stack: Arc<dyn BleStack>) -> Self {
        Self { stack }
    }
}

#[async_trait]
impl ScheduleTransport for WebTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Web
    }

    async fn is_supported(&self) -> bool {
        self.stack.is_available().await
    }

    #[instrument(skip(self, payload, attempt), fields(len = payload.len()))]
    async fn send(&self, payload: &str, attempt: &mut SendAttempt) -> Result<()> {
        let result = self.deliver(payload, attempt).await;
        attempt.finish(result)
    }
}

impl WebTransport {
    async fn deliver(&self, payload: &str, attempt: &mut SendAttempt) -> Result<()> {
        if !self.is_supported().await {
            return Err(Error::UnsupportedPlatform);
        }

        attempt.advance(SendState::Connecting);
        info!("Requesting a device with service {}", SCHEDULE_SERVICE_UUID);
        let mut link = self
            .stack
            .request_device(SCHEDULE_SERVICE_UUID)
            .await
            .map_err(connection_failure)?;

        attempt.advance(SendState::Writing);
        let written = link
            .write(
                SCHEDULE_SERVICE_UUID,
                SCHEDULE_CHARACTERISTIC_UUID,
                payload.as_bytes(),
                WriteMode::WithoutResponse,
            )
            .await
            .map_err(transmission_failure);

        close_link(link.as_mut()).await;
        written
    }
}

/// Transport requested by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportPreference {
    /// Native when a device was remembered at login, otherwise web
    #[default]
    Auto,
    Native,
    Web,
}

/// Picks the transport once at startup
pub fn select_transport(
    stack: Arc<dyn BleStack>,
    device: Option<DeviceRef>,
    preference: TransportPreference,
) -> Box<dyn ScheduleTransport> {
    let kind = match preference {
        TransportPreference::Native => TransportKind::Native,
        TransportPreference::Web => TransportKind::Web,
        TransportPreference::Auto if device.is_some() => TransportKind::Native,
        TransportPreference::Auto => TransportKind::Web,
    };
    debug!("Selected {} transport ({:?})", kind, preference);

    match kind {
        TransportKind::Native => Box::new(NativeTransport::new(stack, device)),
        TransportKind::Web => Box::new(WebTransport::new(stack)),
    }
}

/// Encodes `schedule` afresh and sends it once.
///
/// Failures are logged once and returned; nothing is retried.
#[instrument(skip_all, fields(transport = %transport.kind()))]
pub async fn send_schedule(
    transport: &dyn ScheduleTransport,
    schedule: &Schedule,
) -> Result<SendAttempt> {
    let payload = encode(schedule)?;
    let mut attempt = SendAttempt::new();

    match transport.send(&payload, &mut attempt).await {
        Ok(()) => {
            info!("Schedule sent to BLE device ({})", transport.kind());
            Ok(attempt)
        }
        Err(e) => {
            debug!("Schedule send failed: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_uuids_expand_short_forms() {
        assert_eq!(
            SCHEDULE_SERVICE_UUID.to_string(),
            "0000b00b-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            SCHEDULE_CHARACTERISTIC_UUID.to_string(),
            "0000feed-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn attempt_stops_at_terminal_state() {
        let mut attempt = SendAttempt::new();
        attempt.advance(SendState::Connecting);
        attempt.advance(SendState::Writing);
        let _ = attempt.finish::<()>(Err(Error::TransmissionFailure("rejected".into())));
        attempt.advance(SendState::Connecting);

        assert_eq!(attempt.state(), SendState::Failed);
        assert_eq!(
            attempt.history(),
            &[
                SendState::Idle,
                SendState::Connecting,
                SendState::Writing,
                SendState::Failed
            ]
        );
    }

    #[test]
    fn failure_mapping_keeps_existing_kind() {
        assert!(matches!(
            connection_failure(Error::NoBluetoothAdapters),
            Error::ConnectionFailure(m) if m == "No Bluetooth adapters found"
        ));
        assert!(matches!(
            transmission_failure(Error::TransmissionFailure("x".into())),
            Error::TransmissionFailure(m) if m == "x"
        ));
    }
}
