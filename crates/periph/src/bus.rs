//! One SPI bus shared by several chip-selects.
//!
//! Each device on the bus gets a [`BusDevice`] that frames its transfers with
//! its own chip-select. The bus is held for the whole frame, so at most one
//! chip-select is ever asserted, and a transfer attempted while the bus is
//! held fails with [`BusError::Busy`] instead of interleaving.

use core::cell::RefCell;
use core::fmt;

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, ErrorKind, ErrorType, Operation, SpiBus, SpiDevice};
use embedded_hal_bus::spi::{DeviceError, NoDelay, RefCellDevice};

/// The bus was already held by another transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusBusy;

impl fmt::Display for BusBusy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SPI bus is held by another transfer")
    }
}

impl core::error::Error for BusBusy {}

/// Errors raised by a [`BusDevice`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusError<E> {
    /// Another transfer on the same bus is outstanding. Nothing was clocked.
    Busy,
    /// The bus or the chip-select line failed.
    Device(E),
}

impl<E> From<BusBusy> for BusError<E> {
    fn from(_: BusBusy) -> Self {
        Self::Busy
    }
}

impl<E: spi::Error> spi::Error for BusError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Busy => ErrorKind::Other,
            Self::Device(err) => err.kind(),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for BusError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => BusBusy.fmt(f),
            Self::Device(err) => write!(f, "SPI device error: {err:?}"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for BusError<E> {}

/// Error of a [`BusDevice`] over bus `BUS` with chip-select `CS`.
pub type DeviceFault<BUS, CS> =
    BusError<DeviceError<<BUS as ErrorType>::Error, <CS as digital::ErrorType>::Error>>;

/// SPI bus owner
pub struct SharedBus<BUS> {
    bus: RefCell<BUS>,
}

impl<BUS> SharedBus<BUS> {
    /// Takes ownership of the bus. Chip-select lines should already be deasserted.
    pub fn new(bus: BUS) -> Self {
        Self {
            bus: RefCell::new(bus),
        }
    }

    /// A device on this bus, selected by `cs`.
    pub fn device<CS>(&self, cs: CS) -> BusDevice<'_, BUS, CS> {
        BusDevice {
            bus: &self.bus,
            device: RefCellDevice::new_no_delay(&self.bus, cs),
        }
    }

    /// Run `f` with exclusive access to the raw bus, e.g. to change its clock.
    pub fn with_bus<R>(&self, f: impl FnOnce(&mut BUS) -> R) -> Result<R, BusBusy> {
        let mut bus = self.bus.try_borrow_mut().map_err(|_| BusBusy)?;

        Ok(f(&mut bus))
    }

    /// Destroys the bus owner, returning the bus.
    pub fn into_inner(self) -> BUS {
        self.bus.into_inner()
    }
}

/// A chip-select on a [`SharedBus`].
pub struct BusDevice<'a, BUS, CS> {
    bus: &'a RefCell<BUS>,
    device: RefCellDevice<'a, BUS, CS, NoDelay>,
}

impl<BUS, CS> BusDevice<'_, BUS, CS>
where
    BUS: SpiBus,
    CS: OutputPin,
{
    /// Clock one 16-bit word out, most significant byte first, and return the
    /// word clocked in during the same frame.
    pub fn transfer_word(&mut self, word: u16) -> Result<u16, DeviceFault<BUS, CS>> {
        let mut buffer = word.to_be_bytes();

        self.transfer_in_place(&mut buffer)?;

        Ok(u16::from_be_bytes(buffer))
    }
}

impl<BUS, CS> ErrorType for BusDevice<'_, BUS, CS>
where
    BUS: ErrorType,
    CS: OutputPin,
{
    type Error = DeviceFault<BUS, CS>;
}

impl<BUS, CS> SpiDevice for BusDevice<'_, BUS, CS>
where
    BUS: SpiBus,
    CS: OutputPin,
{
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        if self.bus.try_borrow_mut().is_err() {
            log::error!("SPI transfer attempted while the bus is held");
            return Err(BusError::Busy);
        }

        self.device.transaction(operations).map_err(BusError::Device)
    }
}
