//! SPI peripheral control for the CORE and PWL boards.
//!
//! A [`SharedBus`] serialises frames from every chip-select on a board, a
//! [`Registry`] owns the AD7322 and MAX5437 drivers behind those chip-selects
//! and leases them out one caller at a time.

#![no_std]
#![forbid(unsafe_code)]

pub mod bus;
pub mod link;
pub mod pinout;
pub mod registry;

pub use bus::{BusBusy, BusDevice, BusError, DeviceFault, SharedBus};
pub use link::Report;
pub use pinout::{BusSettings, Pinout, Role};
pub use registry::{DeviceId, Lease, Peripheral, Registry, RegistryError};
