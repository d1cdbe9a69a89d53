use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::schedule::{Intensity, Schedule};
use crate::store::DeviceRef;
use crate::transport::{BleStack, GattLink, WriteMode};
use crate::Result;

/// Live control service
pub const LIVE_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001234_0000_1000_8000_00805f9b34fb);
/// Live control characteristic
pub const LIVE_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00005678_0000_1000_8000_00805f9b34fb);

/// Minimum spacing between live commands in milliseconds
const DEFAULT_COMMAND_DELAY_MS: u64 = 50;

/// Text commands understood by the live control characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveCommand {
    /// Switch both channels off
    Off,
    /// Switch on at the given levels
    Levels {
        red_light: Intensity,
        sunlight: Intensity,
    },
}

impl LiveCommand {
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LiveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveCommand::Off => write!(f, "light_off"),
            LiveCommand::Levels {
                red_light,
                sunlight,
            } => write!(f, "R{};S{}", red_light.value(), sunlight.value()),
        }
    }
}

/// Spaces out commands so slider updates do not flood the link
struct CommandQueue {
    /// Minimum delay between commands
    min_delay: Duration,
    /// Last command timestamp; held for the whole command
    last_command: Mutex<Option<Instant>>,
}

impl CommandQueue {
    fn new(min_delay_ms: u64) -> Self {
        Self {
            min_delay: Duration::from_millis(min_delay_ms),
            last_command: Mutex::new(None),
        }
    }

    async fn execute<T, F>(&self, future: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last_cmd = self.last_command.lock().await;

        if let Some(elapsed) = last_cmd.map(|at| at.elapsed()) {
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                trace!("Rate limiting: waiting {:?} before next command", wait_time);
                time::sleep(wait_time).await;
            }
        }

        let result = future.await;
        *last_cmd = Some(Instant::now());
        result
    }
}

/// Live on/off and intensity control of a connected grow light
pub struct GrowLight {
    link: Box<dyn GattLink>,
    command_queue: CommandQueue,
    /// Current power state
    pub is_on: bool,
    /// Current red light intensity
    pub red_light: Intensity,
    /// Current sunlight intensity
    pub sunlight: Intensity,
}

impl GrowLight {
    /// Connects to the device captured at login. The light starts off at zero intensity.
    #[instrument(skip(stack))]
    pub async fn connect(stack: &dyn BleStack, device: &DeviceRef) -> Result<GrowLight> {
        info!("Initializing grow light controller");
        let mut link = stack.connect(device.id()).await?;
        if let Err(e) = link.discover().await {
            if let Err(close) = link.disconnect().await {
                warn!("Failed to disconnect: {}", close);
            }
            return Err(e);
        }

        info!("Successfully connected to {}", device);
        Ok(Self::from_link(link))
    }

    /// Wraps an already connected link
    pub fn from_link(link: Box<dyn GattLink>) -> GrowLight {
        Self::with_command_delay(link, DEFAULT_COMMAND_DELAY_MS)
    }

    pub fn with_command_delay(link: Box<dyn GattLink>, command_delay_ms: u64) -> GrowLight {
        GrowLight {
            link,
            command_queue: CommandQueue::new(command_delay_ms),
            is_on: false,
            red_light: Intensity::MIN,
            sunlight: Intensity::MIN,
        }
    }

    fn levels(&self) -> LiveCommand {
        LiveCommand::Levels {
            red_light: self.red_light,
            sunlight: self.sunlight,
        }
    }

    /// Turns the light on at the current intensities
    #[instrument(skip(self))]
    pub async fn power_on(&mut self) -> Result<()> {
        debug!("Turning grow light on");
        self.send_command(self.levels()).await?;
        self.is_on = true;
        info!("Grow light powered on");
        Ok(())
    }

    /// Turns the light off
    #[instrument(skip(self))]
    pub async fn power_off(&mut self) -> Result<()> {
        debug!("Turning grow light off");
        self.send_command(LiveCommand::Off).await?;
        self.is_on = false;
        info!("Grow light powered off");
        Ok(())
    }

    /// Flips the power state, like the light switch
    pub async fn toggle(&mut self) -> Result<()> {
        if self.is_on {
            self.power_off().await
        } else {
            self.power_on().await
        }
    }

    /// Updates both intensities; they reach the device only while the light is on
    #[instrument(skip(self))]
    pub async fn set_intensity(&mut self, red_light: Intensity, sunlight: Intensity) -> Result<()> {
        self.red_light = red_light;
        self.sunlight = sunlight;

        if !self.is_on {
            debug!("Light is off, keeping intensities for later");
            return Ok(());
        }

        self.send_command(self.levels()).await?;
        info!("Intensity set to red {} sunlight {}", red_light, sunlight);
        Ok(())
    }

    /// New schedule seeded with the current live intensities
    pub fn scheduler_seed(&self) -> Schedule {
        Schedule::seeded(self.red_light, self.sunlight)
    }

    pub async fn disconnect(mut self) -> Result<()> {
        self.link.disconnect().await
    }

    #[instrument(skip(self), fields(cmd = %command))]
    async fn send_command(&mut self, command: LiveCommand) -> Result<()> {
        let text = command.encode();
        self.command_queue
            .execute(self.link.write(
                LIVE_SERVICE_UUID,
                LIVE_CHARACTERISTIC_UUID,
                text.as_bytes(),
                WriteMode::WithoutResponse,
            ))
            .await?;
        trace!("Command sent successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_commands_encode_as_text() {
        assert_eq!(LiveCommand::Off.encode(), "light_off");
        let levels = LiveCommand::Levels {
            red_light: Intensity::new(40).unwrap(),
            sunlight: Intensity::MIN,
        };
        assert_eq!(levels.encode(), "R40;S0");
    }

    #[test]
    fn live_uuids() {
        assert_eq!(
            LIVE_SERVICE_UUID.to_string(),
            "00001234-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            LIVE_CHARACTERISTIC_UUID.to_string(),
            "00005678-0000-1000-8000-00805f9b34fb"
        );
    }

    #[tokio::test]
    async fn command_queue_spaces_commands() {
        let queue = CommandQueue::new(30);
        let start = Instant::now();
        queue.execute(async {}).await;
        queue.execute(async {}).await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
