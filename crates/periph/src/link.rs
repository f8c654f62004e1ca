//! Byte form of samples handed to the UART link between the CORE and PWL boards.
//!
//! A report is four bytes: the device code, a metadata byte, then the raw
//! conversion result big-endian. Metadata bits:
//!
//! | bit | meaning                                  |
//! |-----|------------------------------------------|
//! | 0   | channel (0 = V0, 1 = V1)                 |
//! | 1   | coding (0 = two's complement, 1 = binary) |
//! | 3:2 | input range code                         |
//! | 7   | captured under a replaced configuration  |

use core::fmt;

use ad7322::sample::CODE_MASK;
use ad7322::{decode_sample, Channel, Coding, InputRange, RangeMismatch, Reading};

use crate::registry::DeviceId;

pub const REPORT_LEN: usize = 4;

const CHANNEL_BIT: u8 = 0x01;
const CODING_BIT: u8 = 0x02;
const RANGE_SHIFT: u8 = 2;
const STALE_BIT: u8 = 0x80;
const RESERVED_BITS: u8 = 0x70;

/// A sample as seen by the other end of the link.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub device: DeviceId,
    pub channel: Channel,
    pub coding: Coding,
    pub range: InputRange,
    pub stale: bool,
    pub code: u16,
}

/// Errors decoding a [`Report`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkError {
    UnknownDevice(u8),
    Reserved(u8),
    Code(RangeMismatch),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDevice(code) => write!(f, "unknown device code {code:#04x}"),
            Self::Reserved(meta) => write!(f, "reserved bits set in metadata {meta:#04x}"),
            Self::Code(err) => err.fmt(f),
        }
    }
}

impl core::error::Error for LinkError {}

impl Report {
    /// Report for a reading of `device`. Unsettled readings carry nothing to report.
    pub fn new(device: DeviceId, reading: &Reading) -> Option<Self> {
        let sample = reading.sample()?;

        Some(Self {
            device,
            channel: sample.channel(),
            coding: sample.coding(),
            range: sample.range(),
            stale: matches!(reading, Reading::Stale(_)),
            code: sample.code,
        })
    }

    pub fn to_be_bytes(&self) -> [u8; REPORT_LEN] {
        let mut meta = (self.range as u8) << RANGE_SHIFT;

        if self.channel == Channel::V1 {
            meta |= CHANNEL_BIT;
        }

        if self.coding == Coding::StraightBinary {
            meta |= CODING_BIT;
        }

        if self.stale {
            meta |= STALE_BIT;
        }

        let [high, low] = self.code.to_be_bytes();

        [self.device as u8, meta, high, low]
    }

    pub fn from_be_bytes(bytes: [u8; REPORT_LEN]) -> Result<Self, LinkError> {
        let [device, meta, high, low] = bytes;

        let device = DeviceId::from_code(device).ok_or(LinkError::UnknownDevice(device))?;

        if meta & RESERVED_BITS != 0 {
            return Err(LinkError::Reserved(meta));
        }

        let code = u16::from_be_bytes([high, low]);

        if code > CODE_MASK {
            return Err(LinkError::Code(RangeMismatch { raw: code }));
        }

        Ok(Self {
            device,
            channel: if meta & CHANNEL_BIT == 0 {
                Channel::V0
            } else {
                Channel::V1
            },
            coding: if meta & CODING_BIT == 0 {
                Coding::TwosComplement
            } else {
                Coding::StraightBinary
            },
            range: InputRange::from_code((meta >> RANGE_SHIFT) as u16),
            stale: meta & STALE_BIT != 0,
            code,
        })
    }

    pub fn volts(&self) -> Result<f32, RangeMismatch> {
        decode_sample(self.code, self.coding, self.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ad7322::{Control, Ranges, Sample};

    fn sample() -> Sample {
        Sample {
            control: Control {
                coding: Coding::StraightBinary,
                ..Control::default().with_channel(Channel::V1)
            },
            ranges: Ranges {
                v0: InputRange::Bipolar10V,
                v1: InputRange::Unipolar10V,
            },
            code: 0x1000,
        }
    }

    #[test]
    fn report_layout() {
        let report = Report::new(DeviceId::AdcZw, &Reading::Stale(sample())).unwrap();

        assert_eq!(report.to_be_bytes(), [0x01, 0x80 | 0x0C | 0x02 | 0x01, 0x10, 0x00]);
        assert_eq!(Report::from_be_bytes(report.to_be_bytes()), Ok(report));
        assert_eq!(report.volts(), Ok(5.0));
    }

    #[test]
    fn unsettled_readings_are_not_reported() {
        assert_eq!(Report::new(DeviceId::AdcXy, &Reading::Unsettled), None);
    }

    #[test]
    fn rejects_corrupt_reports() {
        assert_eq!(
            Report::from_be_bytes([0x42, 0x00, 0x00, 0x00]),
            Err(LinkError::UnknownDevice(0x42))
        );
        assert_eq!(
            Report::from_be_bytes([0x00, 0x10, 0x00, 0x00]),
            Err(LinkError::Reserved(0x10))
        );
        assert_eq!(
            Report::from_be_bytes([0x00, 0x00, 0x20, 0x00]),
            Err(LinkError::Code(RangeMismatch { raw: 0x2000 }))
        );
    }
}
