//! Ownership of the devices on a board.
//!
//! Devices are looked up by [`DeviceId`] and handed out as [`Lease`]s. A lease
//! is exclusive and released when it is dropped, on every exit path, so two
//! callers can never interleave frames to one device and desynchronise its
//! pipeline.

use core::cell::{RefCell, RefMut};
use core::fmt;
use core::ops::{Deref, DerefMut};

use ad7322::Ad7322;
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use max5437::Max5437;

/// Most devices a single registry can hold.
pub const MAX_DEVICES: usize = 8;

/// The SPI devices across both boards.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceId {
    /// ADC sampling the X and Y inputs.
    AdcXy = 0,
    /// ADC sampling the Z and W inputs.
    AdcZw = 1,
    RdigIc = 2,
    Rdig1 = 3,
    Rdig2 = 4,
    AdcPwl = 5,
    RdigPwl = 6,
}

impl DeviceId {
    /// Iterate over all devices.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::AdcXy,
            Self::AdcZw,
            Self::RdigIc,
            Self::Rdig1,
            Self::Rdig2,
            Self::AdcPwl,
            Self::RdigPwl,
        ]
        .into_iter()
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::all().find(|id| *id as u8 == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::AdcXy => "AD_XY",
            Self::AdcZw => "AD_ZW",
            Self::RdigIc => "RDIG_IC",
            Self::Rdig1 => "RDIG_1",
            Self::Rdig2 => "RDIG_2",
            Self::AdcPwl => "AD_PWL",
            Self::RdigPwl => "RDIG_PWL",
        }
    }

    /// Whether the chip behind this id is an AD7322 rather than a MAX5437.
    pub const fn is_adc(self) -> bool {
        matches!(self, Self::AdcXy | Self::AdcZw | Self::AdcPwl)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by a [`Registry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// The device is leased to someone else. Retry once it is released.
    DeviceBusy(DeviceId),
    UnknownDevice(DeviceId),
    /// The device is not of the kind requested.
    WrongKind(DeviceId),
    Duplicate(DeviceId),
    Full,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceBusy(id) => write!(f, "{id} is already leased"),
            Self::UnknownDevice(id) => write!(f, "{id} is not registered"),
            Self::WrongKind(id) => write!(f, "{id} is not that kind of device"),
            Self::Duplicate(id) => write!(f, "{id} is registered twice"),
            Self::Full => write!(f, "registry holds at most {MAX_DEVICES} devices"),
        }
    }
}

impl core::error::Error for RegistryError {}

/// A device driver held by the registry.
pub enum Peripheral<SPI, D> {
    Adc(Ad7322<SPI, D>),
    Pot(Max5437<SPI>),
}

struct Slot<SPI, D> {
    id: DeviceId,
    peripheral: RefCell<Peripheral<SPI, D>>,
}

/// Exclusive access to a registered device, released on drop.
pub struct Lease<'r, T> {
    id: DeviceId,
    guard: RefMut<'r, T>,
}

impl<T> Lease<'_, T> {
    pub fn id(&self) -> DeviceId {
        self.id
    }
}

impl<T> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        log::trace!("{} released", self.id);
    }
}

/// Devices of one board, in registration order.
pub struct Registry<SPI, D> {
    slots: heapless::Vec<Slot<SPI, D>, MAX_DEVICES>,
}

impl<SPI, D> Default for Registry<SPI, D> {
    fn default() -> Self {
        Self {
            slots: heapless::Vec::new(),
        }
    }
}

impl<SPI: SpiDevice, D: DelayNs> Registry<SPI, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: DeviceId, peripheral: Peripheral<SPI, D>) -> Result<(), RegistryError> {
        if self.slots.iter().any(|slot| slot.id == id) {
            return Err(RegistryError::Duplicate(id));
        }

        self.slots
            .push(Slot {
                id,
                peripheral: RefCell::new(peripheral),
            })
            .map_err(|_| RegistryError::Full)?;

        log::debug!("{} registered", id);

        Ok(())
    }

    /// Register an AD7322 behind `spi`.
    pub fn add_adc(&mut self, id: DeviceId, spi: SPI, delay: D) -> Result<(), RegistryError> {
        self.insert(id, Peripheral::Adc(Ad7322::new(spi, delay)))
    }

    /// Register a MAX5437 behind `spi`.
    pub fn add_pot(&mut self, id: DeviceId, spi: SPI) -> Result<(), RegistryError> {
        self.insert(id, Peripheral::Pot(Max5437::new(spi)))
    }

    /// Registered devices, in registration order.
    pub fn list_devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.slots.iter().map(|slot| slot.id)
    }

    /// Lease a device, whatever its kind. Fails rather than waits if it is already leased.
    pub fn acquire(&self, id: DeviceId) -> Result<Lease<'_, Peripheral<SPI, D>>, RegistryError> {
        let guard = self.borrow(id)?;

        Ok(Lease { id, guard })
    }

    /// Lease an ADC.
    pub fn acquire_adc(&self, id: DeviceId) -> Result<Lease<'_, Ad7322<SPI, D>>, RegistryError> {
        let guard = RefMut::filter_map(self.borrow(id)?, |peripheral| match peripheral {
            Peripheral::Adc(adc) => Some(adc),
            Peripheral::Pot(_) => None,
        })
        .map_err(|_| RegistryError::WrongKind(id))?;

        Ok(Lease { id, guard })
    }

    /// Lease a digital potentiometer.
    pub fn acquire_pot(&self, id: DeviceId) -> Result<Lease<'_, Max5437<SPI>>, RegistryError> {
        let guard = RefMut::filter_map(self.borrow(id)?, |peripheral| match peripheral {
            Peripheral::Pot(pot) => Some(pot),
            Peripheral::Adc(_) => None,
        })
        .map_err(|_| RegistryError::WrongKind(id))?;

        Ok(Lease { id, guard })
    }

    fn borrow(&self, id: DeviceId) -> Result<RefMut<'_, Peripheral<SPI, D>>, RegistryError> {
        let slot = self
            .slots
            .iter()
            .find(|slot| slot.id == id)
            .ok_or(RegistryError::UnknownDevice(id))?;

        let guard = slot.peripheral.try_borrow_mut().map_err(|_| {
            log::warn!("{} lease contended", id);
            RegistryError::DeviceBusy(id)
        })?;

        log::trace!("{} leased", id);

        Ok(guard)
    }
}
