//! Shared I2C bus access
//!
//! Every dimmer module hangs off the same two-wire bus. Transactions from
//! different drivers must never interleave, so the bus is wrapped in a
//! [`SharedBus`] whose lock is held for exactly one transaction (address,
//! register and payload), discovery probes included. Bus calls block, so
//! each transaction runs on the blocking pool.

use crate::error::{RouterError, Result};
use std::sync::{Arc, Mutex};

/// Raw bus operations, implemented by the hardware adapter
pub trait I2cBus: Send {
    /// Address-only transaction. `Ok` means the device acknowledged.
    fn probe(&mut self, address: u8) -> Result<()>;

    /// Write `bytes` to the device at `address` in a single transaction
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<()>;
}

/// Cloneable handle serializing access to one physical bus
#[derive(Clone)]
pub struct SharedBus {
    inner: Arc<Mutex<Box<dyn I2cBus>>>,
}

impl SharedBus {
    /// Wrap a bus implementation
    pub fn new<B: I2cBus + 'static>(bus: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(bus))),
        }
    }

    /// Probe a single address
    pub async fn probe(&self, address: u8) -> Result<()> {
        self.transaction(move |bus| bus.probe(address)).await
    }

    /// Write `payload` to `register` of the device at `address`
    pub async fn write_register(&self, address: u8, register: u8, payload: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(register);
        frame.extend_from_slice(payload);

        self.transaction(move |bus| bus.write(address, &frame)).await
    }

    async fn transaction<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut dyn I2cBus) -> Result<()> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut bus = inner
                .lock()
                .map_err(|_| RouterError::bus("Bus lock poisoned"))?;
            op(&mut **bus)
        })
        .await
        .map_err(|e| RouterError::bus(format!("Bus transaction aborted: {}", e)))?
    }
}

impl std::fmt::Debug for SharedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBus").finish_non_exhaustive()
    }
}

/// Stand-in used when no bus device could be opened: every transaction fails,
/// so dimmers stay disabled while relay bypass keeps working.
#[derive(Debug, Default)]
pub struct DetachedBus;

impl I2cBus for DetachedBus {
    fn probe(&mut self, address: u8) -> Result<()> {
        Err(RouterError::bus(format!(
            "No bus attached: cannot probe 0x{:02x}",
            address
        )))
    }

    fn write(&mut self, address: u8, _bytes: &[u8]) -> Result<()> {
        Err(RouterError::bus(format!(
            "No bus attached: cannot write to 0x{:02x}",
            address
        )))
    }
}

/// Linux `/dev/i2c-*` character device
#[cfg(feature = "linux-i2c")]
pub struct LinuxI2cBus {
    device: linux_embedded_hal::I2cdev,
}

#[cfg(feature = "linux-i2c")]
impl LinuxI2cBus {
    /// Open the bus device at `path`
    pub fn open(path: &str) -> Result<Self> {
        let device = linux_embedded_hal::I2cdev::new(path)
            .map_err(|e| RouterError::bus(format!("Failed to open {}: {:?}", path, e)))?;
        Ok(Self { device })
    }
}

#[cfg(feature = "linux-i2c")]
impl I2cBus for LinuxI2cBus {
    fn probe(&mut self, address: u8) -> Result<()> {
        // Zero-length write: the address byte alone tells whether someone acks
        embedded_hal::i2c::I2c::write(&mut self.device, address, &[]).map_err(|e| {
            RouterError::bus(format!(
                "TwoWire communication error @ 0x{:02x}: {:?}",
                address, e
            ))
        })
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<()> {
        embedded_hal::i2c::I2c::write(&mut self.device, address, bytes).map_err(|e| {
            RouterError::bus(format!(
                "TwoWire communication error @ 0x{:02x}: {:?}",
                address, e
            ))
        })
    }
}
