/*!
 # Device login and key-value storage

 The only state kept between runs is the identifier of the device the user
 logged in with, stored under [`DEVICE_ID_KEY`] in a small JSON file.
*/

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::{Error, Result};

/// Key holding the remembered device identifier
pub const DEVICE_ID_KEY: &str = "deviceID";

/// Identifier of the device captured at login (peripheral id or MAC address)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    id: String,
}

impl DeviceRef {
    /// Trims `id`, rejecting blank identifiers
    pub fn new(id: &str) -> Result<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::InvalidDeviceId);
        }
        Ok(Self { id: id.to_string() })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// JSON object file used as key-value storage
#[derive(Debug)]
pub struct DeviceStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl DeviceStore {
    /// Opens the store at `path`; a missing file is an empty store
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Map::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No device store yet");
                Map::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Device remembered by the last successful login
    pub fn device_id(&self) -> Option<DeviceRef> {
        match self.entries.get(DEVICE_ID_KEY)? {
            Value::String(id) => DeviceRef::new(id).ok(),
            other => {
                warn!("Ignoring non-string {}: {}", DEVICE_ID_KEY, other);
                None
            }
        }
    }

    /// Validates `id` and remembers it for later runs
    #[instrument(skip(self))]
    pub fn login(&mut self, id: &str) -> Result<DeviceRef> {
        let device = DeviceRef::new(id)?;
        self.entries.insert(
            DEVICE_ID_KEY.to_string(),
            Value::String(device.id().to_string()),
        );
        self.flush()?;
        info!("Logged in to device {}", device);
        Ok(device)
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, text)?;
        debug!("Device store written");
        Ok(())
    }
}
