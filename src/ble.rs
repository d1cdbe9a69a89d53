use async_trait::async_trait;
use btleplug::api::{
    Central, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::future::join_all;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::transport::{BleStack, GattLink, WriteMode};
use crate::{Error, Result};

/// Scanning behaviour of the btleplug stack
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Maximum time to look for a device before giving up
    pub discovery_timeout: Duration,
    /// Delay between peripheral polls while scanning
    pub poll_interval: Duration,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Gets the default Bluetooth adapter
#[instrument(skip(manager))]
async fn get_central(manager: &Manager) -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let adapters = manager.adapters().await?;
    match adapters.into_iter().next() {
        Some(adapter) => {
            debug!("Using Bluetooth adapter");
            Ok(adapter)
        }
        None => {
            error!("No Bluetooth adapters found");
            Err(Error::NoBluetoothAdapters)
        }
    }
}

/// [`BleStack`] backed by the platform Bluetooth stack through btleplug.
///
/// The manager is created once and released when the stack is dropped.
pub struct BtleplugStack {
    _manager: Option<Manager>,
    adapter: Option<Adapter>,
    config: StackConfig,
}

impl BtleplugStack {
    /// Opens the platform stack. A missing stack or adapter is not an error here;
    /// it makes [`BleStack::is_available`] report `false`.
    #[instrument]
    pub async fn new(config: StackConfig) -> Self {
        let manager = match Manager::new().await {
            Ok(manager) => Some(manager),
            Err(e) => {
                warn!("Bluetooth is unavailable: {}", e);
                None
            }
        };

        let adapter = match &manager {
            Some(manager) => get_central(manager)
                .await
                .map_err(|e| warn!("Bluetooth is unavailable: {}", e))
                .ok(),
            None => None,
        };

        Self {
            _manager: manager,
            adapter,
            config,
        }
    }

    fn adapter(&self) -> Result<&Adapter> {
        self.adapter.as_ref().ok_or(Error::NoBluetoothAdapters)
    }

    /// Polls scan results until `matches` accepts a peripheral or the discovery window ends
    async fn find_peripheral<F>(&self, filter: ScanFilter, matches: F) -> Result<Option<Peripheral>>
    where
        F: Fn(&Peripheral, &PeripheralProperties) -> bool + Send,
    {
        let central = self.adapter()?;
        central.start_scan(filter).await?;

        let found = self.poll_peripherals(central, matches).await;
        if let Err(e) = central.stop_scan().await {
            warn!("Failed to stop scanning: {}", e);
        }
        found
    }

    async fn poll_peripherals<F>(&self, central: &Adapter, matches: F) -> Result<Option<Peripheral>>
    where
        F: Fn(&Peripheral, &PeripheralProperties) -> bool + Send,
    {
        let start_time = Instant::now();
        let mut found = None;

        while found.is_none() && start_time.elapsed() < self.config.discovery_timeout {
            let peripherals = central.peripherals().await?;
            debug!("Found {} BLE peripherals so far", peripherals.len());

            let properties = join_all(peripherals.iter().map(|p| p.properties())).await;
            found = peripherals
                .into_iter()
                .zip(properties)
                .find(|(p, props)| match props {
                    Ok(Some(props)) => {
                        trace!("Found device: {} {:?}", p.id(), props.local_name);
                        matches(p, props)
                    }
                    _ => false,
                })
                .map(|(p, _)| p);

            if found.is_none() {
                let remaining = self
                    .config
                    .discovery_timeout
                    .saturating_sub(start_time.elapsed());
                info!(
                    "Still scanning for a device... ({} seconds remaining)",
                    remaining.as_secs()
                );
                time::sleep(self.config.poll_interval).await;
            }
        }

        Ok(found)
    }

    async fn open(&self, peripheral: Peripheral) -> Result<Box<dyn GattLink>> {
        info!("Connecting to device...");
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        Ok(Box::new(BtleplugLink { peripheral }))
    }
}

#[async_trait]
impl BleStack for BtleplugStack {
    async fn is_available(&self) -> bool {
        self.adapter.is_some()
    }

    #[instrument(skip(self))]
    async fn connect(&self, device_id: &str) -> Result<Box<dyn GattLink>> {
        let found = self
            .find_peripheral(ScanFilter::default(), |p, _| {
                p.address().to_string().eq_ignore_ascii_case(device_id)
                    || p.id().to_string().eq_ignore_ascii_case(device_id)
            })
            .await?;

        match found {
            Some(peripheral) => self.open(peripheral).await,
            None => {
                error!(
                    "Device {} not found within {} seconds",
                    device_id,
                    self.config.discovery_timeout.as_secs()
                );
                Err(Error::ConnectionFailure(format!(
                    "device {device_id} not found"
                )))
            }
        }
    }

    #[instrument(skip(self))]
    async fn request_device(&self, service: Uuid) -> Result<Box<dyn GattLink>> {
        let filter = ScanFilter {
            services: vec![service],
        };
        // Some platforms ignore the scan filter, so check the advertisement too
        let found = self
            .find_peripheral(filter, |_, props| props.services.contains(&service))
            .await?;

        match found {
            Some(peripheral) => self.open(peripheral).await,
            None => {
                error!("No device advertising {} found", service);
                Err(Error::ConnectionFailure(format!(
                    "no device advertising service {service}"
                )))
            }
        }
    }
}

/// Connected btleplug peripheral
pub struct BtleplugLink {
    peripheral: Peripheral,
}

#[async_trait]
impl GattLink for BtleplugLink {
    async fn discover(&mut self) -> Result<()> {
        debug!("Discovering services...");
        self.peripheral.discover_services().await?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    async fn write(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        if self.peripheral.characteristics().is_empty() {
            self.discover().await?;
        }

        let target = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic)
            .ok_or(Error::CharacteristicNotFound(characteristic.to_string()))?;

        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };

        trace!("Writing {} bytes to {}", data.len(), target.uuid);
        self.peripheral
            .write(&target, data, write_type)
            .await
            .map_err(|e| Error::TransmissionFailure(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
            debug!("Disconnected");
        }
        Ok(())
    }
}
