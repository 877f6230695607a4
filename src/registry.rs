//! Process-wide table of per-device engine instances.
//!
//! Slot `n` holds the engine instance playing on output driver `n`. Slots
//! are filled lazily by [`DeviceRegistry::ensure_initialized`], normally on
//! the first `load` that targets the device, and emptied only by
//! [`DeviceRegistry::shutdown_all`] (which also runs when the registry is
//! dropped).
//!
//! The registry is shared between players with `Rc` and is not `Send`: all
//! calls are expected from the one thread that owns audio control.

use std::cell::RefCell;

use tracing::{debug, info, warn};

use crate::engine::{DriverInfo, EngineError, EngineFactory, EngineInstance, GroupHandle, Interpolation};
use crate::error::{Error, Result};

/// Number of device slots.
pub const MAX_DEVICES: usize = 32;

/// Voice capacity each instance is initialized with unless configured.
pub const DEFAULT_MAX_VOICES: usize = 32;

/// How instances are initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    pub max_voices: usize,
    pub interpolation: Interpolation,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            max_voices: DEFAULT_MAX_VOICES,
            interpolation: Interpolation::default(),
        }
    }
}

#[derive(Default)]
struct DeviceSlot {
    instance: Option<Box<dyn EngineInstance>>,
    /// Present iff the slot is initialized
    master_group: Option<GroupHandle>,
    /// Bumped every time the slot's instance is closed
    epoch: u64,
}

impl DeviceSlot {
    fn is_initialized(&self) -> bool {
        self.instance.is_some() && self.master_group.is_some()
    }
}

/// Lazily initialized engine instance per output device.
pub struct DeviceRegistry {
    factory: Box<dyn EngineFactory>,
    options: RegistryOptions,
    slots: RefCell<Vec<DeviceSlot>>,
}

impl DeviceRegistry {
    pub fn new(factory: impl EngineFactory + 'static, options: RegistryOptions) -> Self {
        let mut slots = Vec::with_capacity(MAX_DEVICES);
        slots.resize_with(MAX_DEVICES, DeviceSlot::default);
        Self {
            factory: Box::new(factory),
            options,
            slots: RefCell::new(slots),
        }
    }

    pub fn options(&self) -> RegistryOptions {
        self.options
    }

    fn check_index(index: usize) -> Result<()> {
        if index >= MAX_DEVICES {
            return Err(Error::SlotOutOfRange(index));
        }
        Ok(())
    }

    /// Make sure device `index` has an initialized engine instance.
    ///
    /// Does nothing if it already has one. On failure the slot is left empty
    /// so a later call tries again.
    pub fn ensure_initialized(&self, index: usize) -> Result<()> {
        Self::check_index(index)?;
        if self.slots.borrow()[index].is_initialized() {
            return Ok(());
        }

        let (instance, master_group) = self.open_instance(index).map_err(|e| {
            warn!("Failed to initialize audio device {}: {}", index, e);
            Error::device_init(index, e)
        })?;

        let mut slots = self.slots.borrow_mut();
        let slot = &mut slots[index];
        slot.instance = Some(instance);
        slot.master_group = Some(master_group);
        Ok(())
    }

    fn open_instance(&self, index: usize) -> std::result::Result<(Box<dyn EngineInstance>, GroupHandle), EngineError> {
        let mut instance = self.factory.create()?;

        let result = (|| {
            let driver_count = instance.driver_count()?;
            debug!("Engine reports {} output drivers", driver_count);

            // Query before select, the driver must exist before we commit to it
            let driver = instance.driver_info(index)?;
            info!("Initializing audio device {}: {}", index, driver.name);

            instance.set_driver(index)?;
            instance.init(self.options.max_voices, self.options.interpolation)?;
            instance.master_group()
        })();

        match result {
            Ok(group) => Ok((instance, group)),
            Err(e) => {
                if let Err(close_err) = instance.close() {
                    debug!("Closing half-initialized instance failed: {}", close_err);
                }
                Err(e)
            }
        }
    }

    pub fn is_initialized(&self, index: usize) -> bool {
        self.slots
            .borrow()
            .get(index)
            .is_some_and(DeviceSlot::is_initialized)
    }

    /// Identifies the instance currently open on `index`.
    ///
    /// Handles obtained from an instance are only valid while the epoch they
    /// were obtained under is current. `None` if the slot is not initialized.
    pub fn epoch(&self, index: usize) -> Option<u64> {
        self.slots
            .borrow()
            .get(index)
            .filter(|s| s.is_initialized())
            .map(|s| s.epoch)
    }

    /// Number of slots currently holding an initialized instance.
    pub fn initialized_count(&self) -> usize {
        self.slots.borrow().iter().filter(|s| s.is_initialized()).count()
    }

    /// Run `f` against the instance of an initialized device.
    pub fn with_instance<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut dyn EngineInstance) -> std::result::Result<R, EngineError>,
    ) -> Result<R> {
        Self::check_index(index)?;
        let mut slots = self.slots.borrow_mut();
        let slot = &mut slots[index];
        if !slot.is_initialized() {
            return Err(Error::DeviceNotInitialized(index));
        }
        let instance = slot.instance.as_deref_mut().ok_or(Error::DeviceNotInitialized(index))?;
        Ok(f(instance)?)
    }

    /// Driver name of an initialized device.
    pub fn device_name(&self, index: usize) -> Result<String> {
        self.with_instance(index, |instance| instance.driver_info(index).map(|d| d.name))
    }

    /// Output drivers the engine can see, whether initialized or not.
    pub fn list_devices(&self) -> Result<Vec<DriverInfo>> {
        Ok(self.factory.drivers()?)
    }

    /// Index of the driver called `name`.
    ///
    /// An exact match wins; otherwise the first driver whose name contains
    /// `name` (ignoring case) is used.
    pub fn find_device(&self, name: &str) -> Result<usize> {
        let drivers = self.list_devices()?;
        if let Some(exact) = drivers.iter().find(|d| d.name == name) {
            return Ok(exact.index);
        }

        let needle = name.to_lowercase();
        drivers
            .iter()
            .find(|d| d.name.to_lowercase().contains(&needle))
            .map(|d| d.index)
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))
    }

    /// Set the master output volume of an initialized device.
    pub fn set_master_volume(&self, index: usize, volume: f32) -> Result<()> {
        let group = self.slots.borrow().get(index).and_then(|s| s.master_group);
        let group = group.ok_or(Error::DeviceNotInitialized(index))?;
        self.with_instance(index, |instance| instance.set_group_volume(group, volume))
    }

    /// Close every initialized instance and reset all slots.
    pub fn shutdown_all(&self) {
        let mut slots = self.slots.borrow_mut();
        for (index, slot) in slots.iter_mut().enumerate() {
            if let Some(mut instance) = slot.instance.take() {
                if let Err(e) = instance.close() {
                    warn!("Error closing audio device {}: {}", index, e);
                }
                debug!("Closed audio device {}", index);
                slot.epoch += 1;
            }
            slot.master_group = None;
        }
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
