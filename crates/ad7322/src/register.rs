//! Encoding and decoding of the AD7322 input shift register.
//!
//! Every frame clocked into the part is a 16-bit word. The top three bits
//! select the register being written (or none at all), the remaining bits
//! carry the fields of that register.

use core::fmt;

/// No register selected, data is ignored by the part.
pub const NONE_REG_SEL: u16 = 0x0000;
/// Control register selected.
pub const CONTROL_REG_SEL: u16 = 0x8000;
/// Range register selected.
pub const RANGE_REG_SEL: u16 = 0xA000;

const REG_SEL_MASK: u16 = 0xE000;
const CONTROL_FIELDS: u16 = 0x07FC;
const RANGE_FIELDS: u16 = 0x1980;

/// Analog input addressed by the next conversion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Channel {
    #[default]
    V0 = 0x0000,
    V1 = 0x0400,
}

impl Channel {
    const MASK: u16 = 0x0400;

    /// Iterate over all channels.
    pub fn all() -> impl Iterator<Item = Self> {
        [Self::V0, Self::V1].into_iter()
    }

    /// The channel the sequencer converts after this one.
    pub const fn next(self) -> Self {
        match self {
            Self::V0 => Self::V1,
            Self::V1 => Self::V0,
        }
    }

    /// Channel number as reported in the channel identifier bits of a result.
    pub const fn index(self) -> u8 {
        match self {
            Self::V0 => 0,
            Self::V1 => 1,
        }
    }

    fn from_bits(bits: u16) -> Self {
        if bits & Self::MASK == 0 {
            Self::V0
        } else {
            Self::V1
        }
    }
}

/// Analog input configuration.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AcquisitionMode {
    #[default]
    SingleEnded = 0x0000,
    PseudoDifferential = 0x0100,
    FullyDifferential = 0x0200,
}

impl AcquisitionMode {
    const MASK: u16 = 0x0300;

    /// Iterate over all modes.
    pub fn all() -> impl Iterator<Item = Self> {
        [Self::SingleEnded, Self::PseudoDifferential, Self::FullyDifferential].into_iter()
    }

    fn from_bits(bits: u16) -> Option<Self> {
        match bits & Self::MASK {
            0x0000 => Some(Self::SingleEnded),
            0x0100 => Some(Self::PseudoDifferential),
            0x0200 => Some(Self::FullyDifferential),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PowerMode {
    /// All internal circuitry powered up at all times.
    #[default]
    Normal = 0x0000,
    /// Everything but the internal reference powers down between conversions.
    AutoStandby = 0x0040,
    /// Part powers down on the 15th SCLK rising edge once the control register is updated.
    AutoShutdown = 0x0080,
    /// All internal circuitry powered down.
    FullShutdown = 0x00C0,
}

impl PowerMode {
    const MASK: u16 = 0x00C0;

    /// Iterate over all power modes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::Normal,
            Self::AutoStandby,
            Self::AutoShutdown,
            Self::FullShutdown,
        ]
        .into_iter()
    }

    /// Time in microseconds the part needs after a transition into or out of
    /// this mode before a conversion is trustworthy.
    pub const fn power_up_us(self) -> u32 {
        match self {
            Self::Normal => 0,
            Self::AutoStandby => 1,
            Self::AutoShutdown | Self::FullShutdown => crate::POWER_UP_US,
        }
    }

    /// Time in microseconds the part needs before every frame while in this
    /// mode, since it powers down again after each conversion.
    pub const fn wake_per_frame_us(self) -> u32 {
        match self {
            Self::AutoStandby | Self::AutoShutdown => self.power_up_us(),
            Self::Normal | Self::FullShutdown => 0,
        }
    }

    fn from_bits(bits: u16) -> Self {
        match bits & Self::MASK {
            0x0040 => Self::AutoStandby,
            0x0080 => Self::AutoShutdown,
            0x00C0 => Self::FullShutdown,
            _ => Self::Normal,
        }
    }
}

/// Output coding used for the next conversion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Coding {
    #[default]
    TwosComplement = 0x0000,
    StraightBinary = 0x0020,
}

impl Coding {
    const MASK: u16 = 0x0020;

    /// Iterate over both codings.
    pub fn all() -> impl Iterator<Item = Self> {
        [Self::TwosComplement, Self::StraightBinary].into_iter()
    }

    fn from_bits(bits: u16) -> Self {
        if bits & Self::MASK == 0 {
            Self::TwosComplement
        } else {
            Self::StraightBinary
        }
    }
}

/// Reference used for the next conversion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ReferenceSource {
    Internal = 0x0010,
    #[default]
    External = 0x0000,
}

impl ReferenceSource {
    const MASK: u16 = 0x0010;

    /// Iterate over both reference sources.
    pub fn all() -> impl Iterator<Item = Self> {
        [Self::Internal, Self::External].into_iter()
    }

    fn from_bits(bits: u16) -> Self {
        if bits & Self::MASK == 0 {
            Self::External
        } else {
            Self::Internal
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SequencerMode {
    /// Channel sequencer not used.
    #[default]
    Disabled = 0x000C,
    /// Continuous conversions from channel V0 up to the channel selected in
    /// the control register, without further control writes.
    EnabledContiguous = 0x0008,
}

impl SequencerMode {
    const MASK: u16 = 0x000C;

    /// Iterate over both sequencer modes.
    pub fn all() -> impl Iterator<Item = Self> {
        [Self::Disabled, Self::EnabledContiguous].into_iter()
    }

    fn from_bits(bits: u16) -> Option<Self> {
        match bits & Self::MASK {
            0x000C => Some(Self::Disabled),
            0x0008 => Some(Self::EnabledContiguous),
            _ => None,
        }
    }
}

/// Input range of a single channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InputRange {
    /// ±10 V
    #[default]
    Bipolar10V = 0b00,
    /// ±5 V
    Bipolar5V = 0b01,
    /// ±2.5 V
    Bipolar2_5V = 0b10,
    /// 0 V to 10 V
    Unipolar10V = 0b11,
}

impl InputRange {
    const V0_SHIFT: u16 = 11;
    const V1_SHIFT: u16 = 7;

    /// Iterate over all ranges.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::Bipolar10V,
            Self::Bipolar5V,
            Self::Bipolar2_5V,
            Self::Unipolar10V,
        ]
        .into_iter()
    }

    /// Lowest voltage of the range and the width of the range in volts.
    pub const fn span(self) -> (f32, f32) {
        match self {
            Self::Bipolar10V => (-10.0, 20.0),
            Self::Bipolar5V => (-5.0, 10.0),
            Self::Bipolar2_5V => (-2.5, 5.0),
            Self::Unipolar10V => (0.0, 10.0),
        }
    }

    /// Range selected by the two low bits of `code`.
    pub fn from_code(code: u16) -> Self {
        match code & 0b11 {
            0b00 => Self::Bipolar10V,
            0b01 => Self::Bipolar5V,
            0b10 => Self::Bipolar2_5V,
            _ => Self::Unipolar10V,
        }
    }
}

/// Fields of the control register.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Control {
    pub channel: Channel,
    pub mode: AcquisitionMode,
    pub power: PowerMode,
    pub coding: Coding,
    pub reference: ReferenceSource,
    pub sequencer: SequencerMode,
}

impl Control {
    /// Same configuration, addressing another channel.
    pub const fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// Encoded control register word for this configuration.
    pub fn word(&self) -> RegisterWord {
        encode_control(
            self.channel,
            self.mode,
            self.power,
            self.coding,
            self.reference,
            self.sequencer,
        )
    }

    const fn bits(&self) -> u16 {
        CONTROL_REG_SEL
            | self.channel as u16
            | self.mode as u16
            | self.power as u16
            | self.coding as u16
            | self.reference as u16
            | self.sequencer as u16
    }
}

/// Fields of the range register. Each channel is ranged independently.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Ranges {
    pub v0: InputRange,
    pub v1: InputRange,
}

impl Ranges {
    /// Range applied to conversions on `channel`.
    pub const fn get(&self, channel: Channel) -> InputRange {
        match channel {
            Channel::V0 => self.v0,
            Channel::V1 => self.v1,
        }
    }

    /// Encoded range register word for this configuration.
    pub fn word(&self) -> RegisterWord {
        encode_range(self.v0, self.v1)
    }

    const fn bits(&self) -> u16 {
        RANGE_REG_SEL
            | ((self.v0 as u16) << InputRange::V0_SHIFT)
            | ((self.v1 as u16) << InputRange::V1_SHIFT)
    }
}

/// A word clocked into the part, tagged with the register it addresses.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RegisterWord {
    /// No register selected; used to clock out a conversion result.
    #[default]
    None,
    Control(Control),
    Range(Ranges),
}

impl RegisterWord {
    /// The 16-bit value shifted out to the part.
    pub const fn bits(&self) -> u16 {
        match self {
            Self::None => NONE_REG_SEL,
            Self::Control(control) => control.bits(),
            Self::Range(ranges) => ranges.bits(),
        }
    }

    /// Big-endian byte order, as the part expects it on the wire.
    pub const fn to_be_bytes(&self) -> [u8; 2] {
        self.bits().to_be_bytes()
    }

    /// Parse a 16-bit value back into a register word.
    ///
    /// Rejects words addressing registers this driver does not program and
    /// words with reserved bits set.
    pub fn from_bits(bits: u16) -> Result<Self, InvalidWord> {
        let fields = bits & !REG_SEL_MASK;

        match bits & REG_SEL_MASK {
            NONE_REG_SEL if bits == NONE_REG_SEL => Ok(Self::None),
            CONTROL_REG_SEL if fields & !CONTROL_FIELDS == 0 => {
                let mode = AcquisitionMode::from_bits(bits).ok_or(InvalidWord(bits))?;
                let sequencer = SequencerMode::from_bits(bits).ok_or(InvalidWord(bits))?;

                Ok(Self::Control(Control {
                    channel: Channel::from_bits(bits),
                    mode,
                    power: PowerMode::from_bits(bits),
                    coding: Coding::from_bits(bits),
                    reference: ReferenceSource::from_bits(bits),
                    sequencer,
                }))
            }
            RANGE_REG_SEL if fields & !RANGE_FIELDS == 0 => Ok(Self::Range(Ranges {
                v0: InputRange::from_code(bits >> InputRange::V0_SHIFT),
                v1: InputRange::from_code(bits >> InputRange::V1_SHIFT),
            })),
            _ => Err(InvalidWord(bits)),
        }
    }
}

/// A 16-bit value that is not the encoding of any [`RegisterWord`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InvalidWord(pub u16);

impl fmt::Display for InvalidWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x} is not a valid AD7322 register word", self.0)
    }
}

impl core::error::Error for InvalidWord {}

/// Build a control register word from its fields.
pub fn encode_control(
    channel: Channel,
    mode: AcquisitionMode,
    power: PowerMode,
    coding: Coding,
    reference: ReferenceSource,
    sequencer: SequencerMode,
) -> RegisterWord {
    RegisterWord::Control(Control {
        channel,
        mode,
        power,
        coding,
        reference,
        sequencer,
    })
}

/// Build a range register word from the ranges of both channels.
pub fn encode_range(range_v0: InputRange, range_v1: InputRange) -> RegisterWord {
    RegisterWord::Range(Ranges {
        v0: range_v0,
        v1: range_v1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_word_matches_register_map() {
        let word = encode_control(
            Channel::V0,
            AcquisitionMode::SingleEnded,
            PowerMode::Normal,
            Coding::TwosComplement,
            ReferenceSource::Internal,
            SequencerMode::Disabled,
        );

        assert_eq!(word.bits(), 0x801C);
        assert_eq!(word.to_be_bytes(), [0x80, 0x1C]);

        let word = encode_control(
            Channel::V1,
            AcquisitionMode::FullyDifferential,
            PowerMode::FullShutdown,
            Coding::StraightBinary,
            ReferenceSource::External,
            SequencerMode::EnabledContiguous,
        );

        assert_eq!(word.bits(), 0x8000 | 0x0400 | 0x0200 | 0x00C0 | 0x0020 | 0x0008);
    }

    #[test]
    fn power_up_default_control() {
        assert_eq!(Control::default().word().bits(), 0x800C);
    }

    #[test]
    fn control_words_survive_decoding() {
        for channel in Channel::all() {
            for mode in AcquisitionMode::all() {
                for power in PowerMode::all() {
                    for coding in Coding::all() {
                        for reference in ReferenceSource::all() {
                            for sequencer in SequencerMode::all() {
                                let word = encode_control(
                                    channel, mode, power, coding, reference, sequencer,
                                );
                                let decoded = RegisterWord::from_bits(word.bits()).unwrap();

                                assert_eq!(decoded, word);
                                assert_eq!(decoded.bits(), word.bits());
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn range_word_touches_only_range_fields() {
        for v0 in InputRange::all() {
            for v1 in InputRange::all() {
                let bits = encode_range(v0, v1).bits();

                assert_eq!(bits & REG_SEL_MASK, RANGE_REG_SEL);
                assert_eq!(bits & !(REG_SEL_MASK | 0x1800 | 0x0180), 0);
                assert_eq!((bits >> 11) & 0b11, v0 as u16);
                assert_eq!((bits >> 7) & 0b11, v1 as u16);
            }
        }

        assert_eq!(
            encode_range(InputRange::Bipolar5V, InputRange::Unipolar10V).bits(),
            0xA000 | 0x0800 | 0x0180
        );
    }

    #[test]
    fn rejects_reserved_and_unknown_words() {
        // sequencer bits 00 and reserved bit 0
        assert_eq!(RegisterWord::from_bits(0x8010), Err(InvalidWord(0x8010)));
        assert_eq!(RegisterWord::from_bits(0x800D), Err(InvalidWord(0x800D)));
        // mode bits 11
        assert_eq!(RegisterWord::from_bits(0x830C), Err(InvalidWord(0x830C)));
        // sequence register
        assert_eq!(RegisterWord::from_bits(0xE000), Err(InvalidWord(0xE000)));
        // range word with bit 0 set
        assert_eq!(RegisterWord::from_bits(0xA001), Err(InvalidWord(0xA001)));
        // data with no register selected
        assert_eq!(RegisterWord::from_bits(0x0001), Err(InvalidWord(0x0001)));

        assert_eq!(RegisterWord::from_bits(0x0000), Ok(RegisterWord::None));
    }
}
