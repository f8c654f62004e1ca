//! Pin assignments of the CORE and PWL boards and the settings of their SPI bus.

use core::fmt;
use core::str::FromStr;

use embedded_hal::spi::{Mode, MODE_2};

use crate::registry::DeviceId;

/// Which of the two cooperating MCUs this is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Core,
    Pwl,
}

impl Role {
    pub fn pinout(self) -> &'static Pinout {
        match self {
            Self::Core => &CORE,
            Self::Pwl => &PWL,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnknownRole;

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("role must be `core` or `pwl`")
    }
}

impl core::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("core") {
            Ok(Self::Core)
        } else if s.eq_ignore_ascii_case("pwl") {
            Ok(Self::Pwl)
        } else {
            Err(UnknownRole)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UartPins {
    pub rx: u8,
    pub tx: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct I2cPins {
    pub sda: u8,
    pub scl: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpiPins {
    pub sclk: u8,
    pub mosi: u8,
    pub miso: u8,
}

/// 4x4 matrix keypad.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeypadPins {
    pub rows: [u8; 4],
    pub columns: [u8; 4],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pinout {
    pub role: Role,
    /// UART to the host PC.
    pub uart_host: Option<UartPins>,
    /// UART to the other MCU.
    pub uart_link: UartPins,
    pub i2c: Option<I2cPins>,
    pub spi: SpiPins,
    /// One chip-select line per device on this board's bus.
    pub chip_selects: &'static [(DeviceId, u8)],
    pub keypad: Option<KeypadPins>,
}

pub const CORE: Pinout = Pinout {
    role: Role::Core,
    uart_host: Some(UartPins { rx: 0, tx: 1 }),
    uart_link: UartPins { rx: 20, tx: 21 },
    // The board notes list 18 and 19 both as SDA; 19 is the clock line.
    i2c: Some(I2cPins { sda: 18, scl: 19 }),
    spi: SpiPins {
        sclk: 9,
        mosi: 10,
        miso: 11,
    },
    chip_selects: &[
        (DeviceId::RdigIc, 22),
        (DeviceId::AdcXy, 23),
        (DeviceId::AdcZw, 24),
        (DeviceId::Rdig1, 25),
        (DeviceId::Rdig2, 12),
    ],
    keypad: Some(KeypadPins {
        rows: [32, 33, 34, 35],
        columns: [28, 29, 30, 31],
    }),
};

pub const PWL: Pinout = Pinout {
    role: Role::Pwl,
    uart_host: None,
    uart_link: UartPins { rx: 0, tx: 1 },
    i2c: None,
    spi: SpiPins {
        sclk: 13,
        mosi: 11,
        miso: 12,
    },
    chip_selects: &[(DeviceId::RdigPwl, 9), (DeviceId::AdcPwl, 8)],
    keypad: None,
};

impl Pinout {
    /// Chip-select line of `id`, if the device sits on this board.
    pub fn chip_select(&self, id: DeviceId) -> Option<u8> {
        self.chip_selects
            .iter()
            .find(|(device, _)| *device == id)
            .map(|(_, pin)| *pin)
    }

    /// Devices on this board's bus.
    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.chip_selects.iter().map(|(device, _)| *device)
    }

    /// Every pin this board assigns, in table order.
    pub fn pins(&self) -> impl Iterator<Item = u8> + '_ {
        let uart = self
            .uart_host
            .into_iter()
            .chain(Some(self.uart_link))
            .flat_map(|uart| [uart.rx, uart.tx]);
        let i2c = self.i2c.into_iter().flat_map(|i2c| [i2c.sda, i2c.scl]);
        let spi = [self.spi.sclk, self.spi.mosi, self.spi.miso];
        let chip_selects = self.chip_selects.iter().map(|(_, pin)| *pin);
        let keypad = self
            .keypad
            .into_iter()
            .flat_map(|keypad| keypad.rows.into_iter().chain(keypad.columns));

        uart.chain(i2c)
            .chain(spi)
            .chain(chip_selects)
            .chain(keypad)
    }

    /// The first pin, in table order, found assigned to a second function.
    pub fn first_conflict(&self) -> Option<u8> {
        // one bit per possible pin number
        let mut seen = [0u32; 8];

        self.pins().find(|&pin| {
            let (word, bit) = (usize::from(pin / 32), 1 << (pin % 32));
            let clash = seen[word] & bit != 0;

            seen[word] |= bit;

            clash
        })
    }

    /// The first device whose chip-select is one of `reserved`, e.g. lines the
    /// host's SPI controller drives itself.
    pub fn chip_select_clash(&self, reserved: &[u8]) -> Option<(DeviceId, u8)> {
        self.chip_selects
            .iter()
            .find(|(_, pin)| reserved.contains(pin))
            .copied()
    }
}

/// Clock and mode of a board's SPI bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusSettings {
    pub clock_hz: u32,
    pub mode: Mode,
}

impl Default for BusSettings {
    /// 1 MHz, SCLK idling high with data captured on the falling edge.
    fn default() -> Self {
        Self {
            clock_hz: 1_000_000,
            mode: MODE_2,
        }
    }
}
