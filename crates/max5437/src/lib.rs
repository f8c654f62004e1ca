//! Provides a driver for a Maxim MAX5437 128-tap digital potentiometer via the `embedded-hal` ecosystem.

#![no_std]
#![forbid(unsafe_code)]

use core::fmt;

use embedded_hal::spi::SpiDevice;

/// Wiper at the low end of the resistor string.
pub const MIN_POSITION: u8 = 0x00;
/// Wiper at mid-scale.
pub const MID_POSITION: u8 = 0x3F;
/// Wiper at the high end of the resistor string.
pub const MAX_POSITION: u8 = 0x7F;

/// Command byte preceding the wiper position in a frame.
const WRITE_WIPER: u8 = 0x00;

/// Errors raised by the [`Max5437`] driver.
#[derive(Debug, PartialEq)]
pub enum Error<E> {
    /// SPI communication error
    Spi(E),
    /// Requested wiper position outside `MIN_POSITION..=MAX_POSITION`.
    /// Nothing was sent to the part.
    OutOfRange(u8),
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi(err) => write!(f, "SPI error: {err:?}"),
            Self::OutOfRange(position) => write!(
                f,
                "wiper position {position:#04x} outside {MIN_POSITION:#04x}..={MAX_POSITION:#04x}"
            ),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Error<E> {}

/// Frame that moves the wiper to `position`.
pub fn encode_wiper<E>(position: u8) -> Result<u16, Error<E>> {
    if !(MIN_POSITION..=MAX_POSITION).contains(&position) {
        return Err(Error::OutOfRange(position));
    }

    Ok(u16::from_be_bytes([WRITE_WIPER, position]))
}

/// MAX5437 driver
pub struct Max5437<SPI> {
    spi: SPI,
    wiper: Option<u8>,
}

impl<SPI: SpiDevice> Max5437<SPI> {
    /// Creates a new driver from an SPI device.
    /// The wiper position is unknown until the first [`Max5437::set_wiper`].
    pub fn new(spi: SPI) -> Self {
        spi.into()
    }

    /// Move the wiper.
    pub fn set_wiper(&mut self, position: u8) -> Result<(), Error<SPI::Error>> {
        let frame = encode_wiper(position)?;

        self.spi.write(&frame.to_be_bytes()).map_err(Error::Spi)?;

        log::debug!("MAX5437 wiper -> {:#04x}", position);

        self.wiper = Some(position);

        Ok(())
    }

    /// Last position successfully written.
    pub fn wiper(&self) -> Option<u8> {
        self.wiper
    }

    /// Destroys the driver, returning the SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI: SpiDevice> From<SPI> for Max5437<SPI> {
    fn from(spi: SPI) -> Self {
        Self { spi, wiper: None }
    }
}
