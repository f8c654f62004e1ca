//! Provides a driver for an Analog Devices AD7322 dual channel ADC via the `embedded-hal` ecosystem.
//!
//! The part converts on every frame and a register write only applies to
//! conversions after the frame it arrives in, so the word clocked out during a
//! frame belongs to a configuration written two frames earlier. [`Ad7322`]
//! tracks that pipeline and stamps every result with the configuration that
//! actually produced it.

#![no_std]
#![forbid(unsafe_code)]

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;

pub mod register;
pub mod sample;

pub use register::{
    encode_control, encode_range, AcquisitionMode, Channel, Coding, Control, InputRange,
    InvalidWord, PowerMode, Ranges, ReferenceSource, RegisterWord, SequencerMode,
};
pub use sample::{decode_sample, RangeMismatch, Sample};

/// Time the part needs to power up from full shutdown or autoshutdown.
pub const POWER_UP_US: u32 = 500;

/// Errors raised by the [`Ad7322`] driver.
#[derive(Debug, PartialEq)]
pub enum Error<E> {
    /// SPI communication error. The frame may not have been clocked, so the
    /// pipeline is left as it was.
    Spi(E),
    /// The frame clocked out could not have come from the part. The pipeline
    /// still advanced, since the part saw the frame.
    RangeMismatch(RangeMismatch),
}

impl<E> From<RangeMismatch> for Error<E> {
    fn from(err: RangeMismatch) -> Self {
        Self::RangeMismatch(err)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi(err) => write!(f, "SPI error: {err:?}"),
            Self::RangeMismatch(err) => err.fmt(f),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Error<E> {}

/// Where the part is in applying the most recently written configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing written since the driver was created; results are unattributable.
    Uninitialized,
    /// The control word was latched by the last frame.
    ConfigPending(RegisterWord),
    /// The next frame returns the first conversion under the control word.
    Settling(RegisterWord),
    /// Results are being returned under the control word.
    Valid(RegisterWord),
}

/// The interpretation of one frame's worth of returned data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reading {
    /// The returned word cannot be attributed to a known configuration.
    Unsettled,
    /// Real data captured under a configuration that has since been replaced.
    Stale(Sample),
    /// Captured under the configuration currently latched.
    Valid(Sample),
}

impl Reading {
    /// The sample carried by this reading, stale or not.
    pub fn sample(&self) -> Option<&Sample> {
        match self {
            Self::Unsettled => None,
            Self::Stale(sample) | Self::Valid(sample) => Some(sample),
        }
    }

    /// The sample, only if it was captured under the latched configuration.
    pub fn valid(self) -> Option<Sample> {
        match self {
            Self::Valid(sample) => Some(sample),
            _ => None,
        }
    }
}

/// Configuration of one conversion that is still inside the part.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Stamp {
    control: Control,
    ranges: Ranges,
    epoch: u32,
}

/// AD7322 driver
pub struct Ad7322<SPI, D> {
    spi: SPI,
    delay: D,
    state: PipelineState,
    control: Control,
    ranges: Ranges,
    /// Bumped on every register write.
    epoch: u32,
    /// Conversions inside the part, oldest first. `None` is unknown.
    in_flight: [Option<Stamp>; 2],
    last: Option<Sample>,
    /// Power-up time owed by a power mode change, paid before the next frame.
    wake_us: u32,
}

impl<SPI: SpiDevice, D: DelayNs> Ad7322<SPI, D> {
    /// Creates a new driver from an SPI device and a delay source.
    /// Please ensure the SPI bus is in SPI mode 2, aka (1, 0).
    ///
    /// The part is assumed to hold its power-up defaults, but nothing it
    /// returns is trusted until a control word has been written.
    pub fn new(spi: SPI, delay: D) -> Self {
        Self {
            spi,
            delay,
            state: PipelineState::Uninitialized,
            control: Control::default(),
            ranges: Ranges::default(),
            epoch: 0,
            in_flight: [None; 2],
            last: None,
            wake_us: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Control register contents last written to the part.
    pub fn pending_control(&self) -> Control {
        self.control
    }

    /// Range register contents last written to the part.
    pub fn pending_ranges(&self) -> Ranges {
        self.ranges
    }

    /// The last sample returned, stale or valid, with the configuration that produced it.
    pub fn settled(&self) -> Option<&Sample> {
        self.last.as_ref()
    }

    /// Write the control register.
    ///
    /// The returned reading is the data clocked out during the write, which
    /// belongs to a configuration from before it.
    pub fn write(&mut self, control: Control) -> Result<Reading, Error<SPI::Error>> {
        self.frame(control.word())
    }

    /// Write the range register. Ranges apply to conversions after this frame.
    pub fn write_range(&mut self, ranges: Ranges) -> Result<Reading, Error<SPI::Error>> {
        self.frame(ranges.word())
    }

    /// Clock out the next result without touching any register.
    pub fn transfer(&mut self) -> Result<Reading, Error<SPI::Error>> {
        self.frame(RegisterWord::None)
    }

    /// Destroys the driver, returning the SPI device and delay source.
    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }

    fn frame(&mut self, word: RegisterWord) -> Result<Reading, Error<SPI::Error>> {
        let wake_us = self.wake_us.max(self.control.power.wake_per_frame_us());

        if self.wake_us > 0 {
            log::debug!("AD7322 power mode changed, waiting {}us", wake_us);
        }

        if wake_us > 0 {
            self.delay.delay_us(wake_us);
            self.wake_us = 0;
        }

        let mut buffer = word.to_be_bytes();

        self.spi
            .transfer_in_place(&mut buffer)
            .map_err(Error::Spi)?;

        let received = u16::from_be_bytes(buffer);

        log::trace!("AD7322 frame out {:#06x} in {:#06x}", word.bits(), received);

        let returned = self.in_flight[0];

        self.latch(word);

        let next = self.next_stamp(word);

        self.in_flight = [self.in_flight[1], next];

        self.interpret(returned, received)
    }

    /// Apply a written word to the driver's view of the registers and move
    /// the state machine along.
    fn latch(&mut self, word: RegisterWord) {
        let previous = self.control.power;

        match word {
            RegisterWord::None => {}
            RegisterWord::Control(control) => {
                self.control = control;
                self.epoch = self.epoch.wrapping_add(1);
            }
            RegisterWord::Range(ranges) => {
                self.ranges = ranges;
                self.epoch = self.epoch.wrapping_add(1);
            }
        }

        let power = self.control.power;

        if power != previous && power != PowerMode::FullShutdown {
            let owed = power.power_up_us().max(previous.power_up_us());
            self.wake_us = self.wake_us.max(owed);
        }

        let state = match (word, self.state) {
            (RegisterWord::Control(_), _) => PipelineState::ConfigPending(word),
            (RegisterWord::Range(_), PipelineState::Uninitialized) => PipelineState::Uninitialized,
            (RegisterWord::Range(_), _) => PipelineState::ConfigPending(self.control.word()),
            (RegisterWord::None, PipelineState::ConfigPending(control)) => {
                PipelineState::Settling(control)
            }
            (RegisterWord::None, PipelineState::Settling(control)) => PipelineState::Valid(control),
            (RegisterWord::None, state) => state,
        };

        if state != self.state {
            log::debug!("AD7322 pipeline {:?} -> {:?}", self.state, state);
        }

        self.state = state;
    }

    /// Configuration of the conversion the part starts after this frame.
    fn next_stamp(&self, word: RegisterWord) -> Option<Stamp> {
        let channel = match word {
            RegisterWord::Control(control) => control.channel,
            _ => {
                let previous = self.in_flight[1]?.control.channel;

                match self.control.sequencer {
                    SequencerMode::EnabledContiguous => previous.next(),
                    SequencerMode::Disabled => previous,
                }
            }
        };

        Some(Stamp {
            control: self.control.with_channel(channel),
            ranges: self.ranges,
            epoch: self.epoch,
        })
    }

    fn interpret(
        &mut self,
        returned: Option<Stamp>,
        received: u16,
    ) -> Result<Reading, Error<SPI::Error>> {
        let Some(stamp) = returned else {
            return Ok(Reading::Unsettled);
        };

        if stamp.control.power == PowerMode::FullShutdown {
            return Ok(Reading::Unsettled);
        }

        let (channel_id, code) = sample::split_frame(received).map_err(|err| {
            log::warn!("AD7322 returned implausible frame {:#06x}", received);
            err
        })?;

        let sample = Sample {
            control: stamp.control,
            ranges: stamp.ranges,
            code,
        };

        if channel_id != sample.channel().index() {
            log::warn!(
                "AD7322 reported channel {} for a conversion tracked as {:?}",
                channel_id,
                sample.channel()
            );
        }

        self.last = Some(sample);

        if stamp.epoch == self.epoch {
            Ok(Reading::Valid(sample))
        } else {
            Ok(Reading::Stale(sample))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::spi::{ErrorKind, ErrorType, Operation};

    #[derive(Debug, PartialEq)]
    struct MockError;

    impl embedded_hal::spi::Error for MockError {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Frame level model of the part: the word clocked out is the conversion
    /// started two frames earlier.
    struct MockAdc {
        conversions: [u16; 2],
        channel: Channel,
        sequencer: SequencerMode,
        sent: [u16; 16],
        frames: usize,
        stuck_high: bool,
        fail_next: bool,
    }

    impl MockAdc {
        fn new() -> Self {
            Self {
                conversions: [0x0ABC, 0x0ABC],
                channel: Channel::V0,
                sequencer: SequencerMode::Disabled,
                sent: [0; 16],
                frames: 0,
                stuck_high: false,
                fail_next: false,
            }
        }

        fn code(channel: Channel) -> u16 {
            match channel {
                Channel::V0 => 0x0100,
                Channel::V1 => 0x0200,
            }
        }
    }

    impl ErrorType for MockAdc {
        type Error = MockError;
    }

    impl SpiDevice for MockAdc {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
            assert_eq!(operations.len(), 1);

            let Operation::TransferInPlace(words) = &mut operations[0] else {
                panic!("Not an expected operation");
            };

            if self.fail_next {
                self.fail_next = false;
                return Err(MockError);
            }

            let incoming = u16::from_be_bytes([words[0], words[1]]);

            self.sent[self.frames] = incoming;
            self.frames += 1;

            let outgoing = if self.stuck_high {
                0xFFFF
            } else {
                self.conversions[0]
            };

            match RegisterWord::from_bits(incoming) {
                Ok(RegisterWord::Control(control)) => {
                    self.channel = control.channel;
                    self.sequencer = control.sequencer;
                }
                Ok(_) => {
                    if self.sequencer == SequencerMode::EnabledContiguous {
                        self.channel = self.channel.next();
                    }
                }
                Err(_) => return Err(MockError),
            }

            let started = ((self.channel.index() as u16) << 13) | Self::code(self.channel);

            self.conversions = [self.conversions[1], started];

            [words[0], words[1]] = outgoing.to_be_bytes();

            Ok(())
        }
    }

    #[derive(Default)]
    struct MockDelay {
        waited_us: u32,
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.waited_us += ns / 1_000;
        }

        fn delay_us(&mut self, us: u32) {
            self.waited_us += us;
        }
    }

    fn control(channel: Channel) -> Control {
        Control {
            channel,
            mode: AcquisitionMode::SingleEnded,
            power: PowerMode::Normal,
            coding: Coding::TwosComplement,
            reference: ReferenceSource::Internal,
            sequencer: SequencerMode::Disabled,
        }
    }

    #[test]
    fn first_write_settles_after_two_transfers() {
        let mut adc = Ad7322::new(MockAdc::new(), MockDelay::default());

        assert_eq!(adc.state(), PipelineState::Uninitialized);

        let config = control(Channel::V0);

        assert_eq!(adc.write(config), Ok(Reading::Unsettled));
        assert_eq!(adc.state(), PipelineState::ConfigPending(config.word()));

        assert_eq!(adc.transfer(), Ok(Reading::Unsettled));
        assert_eq!(adc.state(), PipelineState::Settling(config.word()));

        let reading = adc.transfer().unwrap();
        let sample = reading.valid().unwrap();

        assert_eq!(adc.state(), PipelineState::Valid(config.word()));
        assert_eq!(sample.control, config);
        assert_eq!(sample.channel(), Channel::V0);
        assert_eq!(sample.code, 0x0100);

        let (spi, _) = adc.release();

        assert_eq!(spi.frames, 3);
        assert_eq!(&spi.sent[..3], &[0x801C, 0x0000, 0x0000]);
    }

    #[test]
    fn old_configuration_is_delivered_while_new_one_settles() {
        let mut adc = Ad7322::new(MockAdc::new(), MockDelay::default());

        let before = control(Channel::V0);
        let after = control(Channel::V1);

        adc.write(before).unwrap();
        adc.transfer().unwrap();
        assert_eq!(adc.transfer().unwrap().valid().unwrap().control, before);

        // Data clocked out during the write and the transfer after it still
        // belongs to the old configuration.
        match adc.write(after).unwrap() {
            Reading::Stale(sample) => assert_eq!(sample.control, before),
            reading => panic!("unexpected {reading:?}"),
        }

        match adc.transfer().unwrap() {
            Reading::Stale(sample) => {
                assert_eq!(sample.control, before);
                assert_eq!(sample.code, 0x0100);
            }
            reading => panic!("unexpected {reading:?}"),
        }

        let sample = adc.transfer().unwrap().valid().unwrap();

        assert_eq!(sample.control, after);
        assert_eq!(sample.code, 0x0200);
        assert_eq!(adc.settled(), Some(&sample));
    }

    #[test]
    fn sequencer_alternates_channels() {
        let mut adc = Ad7322::new(MockAdc::new(), MockDelay::default());

        let config = Control {
            sequencer: SequencerMode::EnabledContiguous,
            ..control(Channel::V0)
        };

        adc.write(config).unwrap();
        adc.transfer().unwrap();

        assert_eq!(
            adc.transfer().unwrap().valid().unwrap().channel(),
            Channel::V0
        );

        for expected in [Channel::V1, Channel::V0, Channel::V1, Channel::V0] {
            let sample = adc.transfer().unwrap().valid().unwrap();

            assert_eq!(sample.channel(), expected);
            assert_eq!(sample.code, MockAdc::code(expected));
            assert_eq!(sample.control, config.with_channel(expected));
        }

        assert_eq!(adc.pending_control(), config);
    }

    #[test]
    fn range_write_restarts_the_pipeline() {
        let mut adc = Ad7322::new(MockAdc::new(), MockDelay::default());

        let config = control(Channel::V1);
        let ranges = Ranges {
            v0: InputRange::Bipolar10V,
            v1: InputRange::Bipolar2_5V,
        };

        adc.write(config).unwrap();
        adc.transfer().unwrap();
        adc.transfer().unwrap();

        let reading = adc.write_range(ranges).unwrap();

        assert_eq!(reading.sample().unwrap().range(), InputRange::Bipolar10V);
        assert!(matches!(reading, Reading::Stale(_)));
        assert_eq!(adc.state(), PipelineState::ConfigPending(config.word()));

        assert!(matches!(adc.transfer(), Ok(Reading::Stale(_))));

        let sample = adc.transfer().unwrap().valid().unwrap();

        assert_eq!(sample.range(), InputRange::Bipolar2_5V);
        assert_eq!(sample.volts(), decode_sample(0x0200, Coding::TwosComplement, InputRange::Bipolar2_5V));
    }

    #[test]
    fn leaving_shutdown_waits_for_power_up() {
        let mut adc = Ad7322::new(MockAdc::new(), MockDelay::default());

        let asleep = Control {
            power: PowerMode::FullShutdown,
            ..control(Channel::V0)
        };

        adc.write(asleep).unwrap();
        adc.transfer().unwrap();
        assert_eq!(adc.transfer(), Ok(Reading::Unsettled));

        adc.write(control(Channel::V0)).unwrap();
        adc.transfer().unwrap();
        assert!(adc.transfer().unwrap().valid().is_some());

        let (_, delay) = adc.release();

        assert_eq!(delay.waited_us, POWER_UP_US);
    }

    #[test]
    fn auto_power_down_waits_before_every_frame() {
        let mut adc = Ad7322::new(MockAdc::new(), MockDelay::default());

        let config = Control {
            power: PowerMode::AutoShutdown,
            ..control(Channel::V0)
        };

        adc.write(config).unwrap();

        for _ in 0..6 {
            adc.transfer().unwrap();
        }

        assert_eq!(adc.delay.waited_us, 6 * POWER_UP_US);

        adc.write(control(Channel::V0)).unwrap();
        adc.transfer().unwrap();
        adc.delay.waited_us = 0;

        adc.transfer().unwrap();
        adc.transfer().unwrap();

        assert_eq!(adc.delay.waited_us, 0);

        let mut adc = Ad7322::new(MockAdc::new(), MockDelay::default());

        adc.write(Control {
            power: PowerMode::AutoStandby,
            ..control(Channel::V0)
        })
        .unwrap();

        for _ in 0..4 {
            adc.transfer().unwrap();
        }

        assert_eq!(adc.delay.waited_us, 4);
    }

    #[test]
    fn bus_error_leaves_pipeline_untouched() {
        let mut adc = Ad7322::new(MockAdc::new(), MockDelay::default());

        let config = Control {
            sequencer: SequencerMode::EnabledContiguous,
            ..control(Channel::V0)
        };

        adc.write(config).unwrap();
        adc.transfer().unwrap();

        let settled = adc.transfer().unwrap().valid().unwrap();

        assert_eq!(settled.channel(), Channel::V0);

        adc.spi.fail_next = true;

        assert_eq!(adc.transfer(), Err(Error::Spi(MockError)));
        assert_eq!(adc.state(), PipelineState::Valid(config.word()));
        assert_eq!(adc.settled(), Some(&settled));
        assert_eq!(adc.spi.frames, 3);

        for expected in [Channel::V1, Channel::V0] {
            let sample = adc.transfer().unwrap().valid().unwrap();

            assert_eq!(sample.channel(), expected);
            assert_eq!(sample.code, MockAdc::code(expected));
            assert_eq!(sample.control, config.with_channel(expected));
        }
    }

    #[test]
    fn implausible_frame_is_reported_without_reset() {
        let mut adc = Ad7322::new(MockAdc::new(), MockDelay::default());

        let config = control(Channel::V0);

        adc.write(config).unwrap();
        adc.transfer().unwrap();

        adc.spi.stuck_high = true;

        assert_eq!(
            adc.transfer(),
            Err(Error::RangeMismatch(RangeMismatch { raw: 0xFFFF }))
        );
        assert_eq!(adc.state(), PipelineState::Valid(config.word()));

        adc.spi.stuck_high = false;

        assert_eq!(adc.transfer().unwrap().valid().unwrap().control, config);
    }
}
