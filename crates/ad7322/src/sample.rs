//! Conversion results and their translation into volts.

use core::fmt;

use crate::register::{Channel, Coding, Control, InputRange, Ranges};

/// Width of a conversion result: sign bit plus 12 data bits.
pub const RESOLUTION_BITS: u32 = 13;

/// Mask of the conversion result within an output frame.
pub const CODE_MASK: u16 = (1 << RESOLUTION_BITS) - 1;

const CHANNEL_ID_SHIFT: u16 = 13;
const LEADING_ZERO: u16 = 0x8000;
const FULL_SCALE_CODES: f32 = (1u32 << RESOLUTION_BITS) as f32;
const MID_SCALE: i16 = 1 << (RESOLUTION_BITS - 1);

/// A raw value that cannot have come from the part at its known resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RangeMismatch {
    pub raw: u16,
}

impl fmt::Display for RangeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "raw value {:#06x} exceeds the {}-bit conversion result",
            self.raw, RESOLUTION_BITS
        )
    }
}

impl core::error::Error for RangeMismatch {}

/// Convert a raw conversion result into volts.
///
/// Two's complement results are centred on the middle of `range`, straight
/// binary results count up from its lower end.
pub fn decode_sample(raw: u16, coding: Coding, range: InputRange) -> Result<f32, RangeMismatch> {
    if raw > CODE_MASK {
        return Err(RangeMismatch { raw });
    }

    let (low, span) = range.span();

    let steps = match coding {
        Coding::StraightBinary => raw as f32,
        Coding::TwosComplement => (sign_extend(raw) + MID_SCALE) as f32,
    };

    Ok(low + steps * span / FULL_SCALE_CODES)
}

fn sign_extend(raw: u16) -> i16 {
    const SHIFT: u32 = 16 - RESOLUTION_BITS;

    ((raw << SHIFT) as i16) >> SHIFT
}

/// Split an output frame into the channel identifier and the conversion result.
///
/// The frame is a leading zero, two channel identifier bits and the result.
pub(crate) fn split_frame(frame: u16) -> Result<(u8, u16), RangeMismatch> {
    if frame & LEADING_ZERO != 0 {
        return Err(RangeMismatch { raw: frame });
    }

    Ok(((frame >> CHANNEL_ID_SHIFT) as u8, frame & CODE_MASK))
}

/// A conversion result stamped with the configuration it was captured under.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Control register contents in effect for the conversion. The channel is
    /// the one actually converted, which differs from the last written one
    /// while the sequencer is running.
    pub control: Control,
    /// Range register contents in effect for the conversion.
    pub ranges: Ranges,
    /// Raw result, `RESOLUTION_BITS` wide.
    pub code: u16,
}

impl Sample {
    pub fn channel(&self) -> Channel {
        self.control.channel
    }

    pub fn coding(&self) -> Coding {
        self.control.coding
    }

    pub fn range(&self) -> InputRange {
        self.ranges.get(self.channel())
    }

    /// The result in volts, under the range and coding it was captured with.
    pub fn volts(&self) -> Result<f32, RangeMismatch> {
        decode_sample(self.code, self.coding(), self.range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twos_complement_bipolar() {
        let range = InputRange::Bipolar10V;
        let coding = Coding::TwosComplement;

        assert_eq!(decode_sample(0x1000, coding, range), Ok(-10.0));
        assert_eq!(decode_sample(0x0000, coding, range), Ok(0.0));
        assert_eq!(decode_sample(0x0800, coding, range), Ok(5.0));
        assert_eq!(decode_sample(0x1800, coding, range), Ok(-5.0));
    }

    #[test]
    fn straight_binary_bipolar() {
        let coding = Coding::StraightBinary;

        assert_eq!(decode_sample(0x0000, coding, InputRange::Bipolar5V), Ok(-5.0));
        assert_eq!(decode_sample(0x1000, coding, InputRange::Bipolar5V), Ok(0.0));
        assert_eq!(decode_sample(0x1800, coding, InputRange::Bipolar2_5V), Ok(1.25));
    }

    #[test]
    fn unipolar_range() {
        assert_eq!(
            decode_sample(0x0000, Coding::StraightBinary, InputRange::Unipolar10V),
            Ok(0.0)
        );
        assert_eq!(
            decode_sample(0x1000, Coding::StraightBinary, InputRange::Unipolar10V),
            Ok(5.0)
        );
        assert_eq!(
            decode_sample(0x0000, Coding::TwosComplement, InputRange::Unipolar10V),
            Ok(5.0)
        );
        assert_eq!(
            decode_sample(0x1000, Coding::TwosComplement, InputRange::Unipolar10V),
            Ok(0.0)
        );

        let top = decode_sample(CODE_MASK, Coding::StraightBinary, InputRange::Unipolar10V).unwrap();
        assert!(top < 10.0 && top > 9.99);
    }

    #[test]
    fn raw_wider_than_resolution() {
        assert_eq!(
            decode_sample(0x2000, Coding::TwosComplement, InputRange::Bipolar10V),
            Err(RangeMismatch { raw: 0x2000 })
        );
    }

    #[test]
    fn frame_layout() {
        assert_eq!(split_frame(0x2ABC), Ok((1, 0x0ABC)));
        assert_eq!(split_frame(0x1FFF), Ok((0, 0x1FFF)));
        assert_eq!(split_frame(0xFFFF), Err(RangeMismatch { raw: 0xFFFF }));
    }

    #[test]
    fn sample_uses_range_of_its_channel() {
        let sample = Sample {
            control: Control::default().with_channel(Channel::V1),
            ranges: Ranges {
                v0: InputRange::Bipolar10V,
                v1: InputRange::Bipolar2_5V,
            },
            code: 0x0800,
        };

        assert_eq!(sample.range(), InputRange::Bipolar2_5V);
        assert_eq!(sample.volts(), Ok(1.25));
    }
}
