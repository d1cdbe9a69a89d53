#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use grow_light_controller::{BleStack, Error, GattLink, Result, WriteMode};
use uuid::Uuid;

/// Everything the code under test asked the stack to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    IsAvailable,
    Connect(String),
    RequestDevice(Uuid),
    Discover,
    Write {
        service: Uuid,
        characteristic: Uuid,
        data: Vec<u8>,
        mode: WriteMode,
    },
    Disconnect,
}

/// In-memory stack that records calls and fails on demand
#[derive(Clone, Default)]
pub struct RecordingStack {
    pub unavailable: bool,
    pub fail_connect: bool,
    pub fail_discover: bool,
    pub fail_write: bool,
    pub(crate) calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(Uuid, Uuid, Vec<u8>, WriteMode)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write {
                    service,
                    characteristic,
                    data,
                    mode,
                } => Some((service, characteristic, data, mode)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn link(&self) -> Box<dyn GattLink> {
        Box::new(RecordingLink {
            stack: self.clone(),
        })
    }
}

#[async_trait]
impl BleStack for RecordingStack {
    async fn is_available(&self) -> bool {
        self.record(Call::IsAvailable);
        !self.unavailable
    }

    async fn connect(&self, device_id: &str) -> Result<Box<dyn GattLink>> {
        self.record(Call::Connect(device_id.to_string()));
        if self.fail_connect {
            return Err(Error::ConnectionFailure("device out of range".into()));
        }
        Ok(self.link())
    }

    async fn request_device(&self, service: Uuid) -> Result<Box<dyn GattLink>> {
        self.record(Call::RequestDevice(service));
        if self.fail_connect {
            return Err(Error::ConnectionFailure("user cancelled the chooser".into()));
        }
        Ok(self.link())
    }
}

pub struct RecordingLink {
    stack: RecordingStack,
}

#[async_trait]
impl GattLink for RecordingLink {
    async fn discover(&mut self) -> Result<()> {
        self.stack.record(Call::Discover);
        if self.stack.fail_discover {
            return Err(Error::CharacteristicNotFound("services".into()));
        }
        Ok(())
    }

    async fn write(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        self.stack.record(Call::Write {
            service,
            characteristic,
            data: data.to_vec(),
            mode,
        });
        if self.stack.fail_write {
            return Err(Error::TransmissionFailure("GATT write rejected".into()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.stack.record(Call::Disconnect);
        Ok(())
    }
}
