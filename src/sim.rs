//! A desktop stand-in for a board's SPI bus, with modelled AD7322 and MAX5437 chips.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use ad7322::sample::CODE_MASK;
use ad7322::{Channel, Coding, Control, PowerMode, Ranges, RegisterWord, SequencerMode};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{ErrorType, SpiBus};

/// Chip-select lines of the simulated board.
#[derive(Clone, Default)]
pub struct Lines {
    selected: Rc<Cell<Option<u8>>>,
    overlaps: Rc<Cell<usize>>,
}

impl Lines {
    /// How many times a line was asserted while another one was.
    pub fn overlaps(&self) -> usize {
        self.overlaps.get()
    }
}

/// Chip-select output on the simulated board.
pub struct SimPin {
    line: u8,
    lines: Lines,
}

impl SimPin {
    pub fn new(line: u8, lines: Lines) -> Self {
        Self { line, lines }
    }
}

impl digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if let Some(other) = self.lines.selected.get() {
            if other != self.line {
                log::error!("line {} asserted while line {} is", self.line, other);
                self.lines.overlaps.set(self.lines.overlaps.get() + 1);
            }
        }

        self.lines.selected.set(Some(self.line));

        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.lines.selected.get() == Some(self.line) {
            self.lines.selected.set(None);
        }

        Ok(())
    }
}

/// Delay backed by the host's sleep.
pub struct SimDelay;

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns.into()));
    }
}

struct SimAdc {
    control: Control,
    ranges: Ranges,
    channel: Channel,
    conversions: [u16; 2],
    frames: u32,
}

impl SimAdc {
    fn new() -> Self {
        Self {
            control: Control::default(),
            ranges: Ranges::default(),
            channel: Channel::V0,
            // whatever the part held before the host came up
            conversions: [0x1555, 0x0AAA],
            frames: 0,
        }
    }

    fn frame(&mut self, word: u16) -> u16 {
        let out = self.conversions[0];

        match RegisterWord::from_bits(word) {
            Ok(RegisterWord::Control(control)) => {
                self.control = control;
                self.channel = control.channel;
            }
            Ok(RegisterWord::Range(ranges)) => {
                self.ranges = ranges;
                self.advance();
            }
            Ok(RegisterWord::None) => self.advance(),
            Err(err) => {
                log::warn!("simulated AD7322 ignored frame: {err}");
                self.advance();
            }
        }

        let started = self.convert();

        self.conversions = [self.conversions[1], started];
        self.frames += 1;

        out
    }

    fn advance(&mut self) {
        if self.control.sequencer == SequencerMode::EnabledContiguous {
            self.channel = self.channel.next();
        }
    }

    fn convert(&self) -> u16 {
        if self.control.power == PowerMode::FullShutdown {
            return 0;
        }

        let (low, span) = self.ranges.get(self.channel).span();
        let steps = ((self.input() - low) / span * 8192.0).round().clamp(0.0, 8191.0) as i32;

        let code = match self.control.coding {
            Coding::StraightBinary => steps as u16,
            Coding::TwosComplement => (steps - 4096) as u16 & CODE_MASK,
        };

        ((self.channel.index() as u16) << 13) | code
    }

    /// Slowly drifting voltages, so successive samples differ.
    fn input(&self) -> f32 {
        let t = self.frames as f32 * 0.05;

        match self.channel {
            Channel::V0 => 2.5 + t.sin(),
            Channel::V1 => -1.2 + 0.5 * t.cos(),
        }
    }
}

struct SimPot {
    wiper: u8,
}

enum Chip {
    Adc(SimAdc),
    Pot(SimPot),
}

impl Chip {
    fn frame(&mut self, word: u16) -> u16 {
        match self {
            Self::Adc(adc) => adc.frame(word),
            Self::Pot(pot) => {
                pot.wiper = (word & 0x7F) as u8;
                log::debug!("simulated MAX5437 wiper at {:#04x}", pot.wiper);
                0
            }
        }
    }
}

/// SPI bus routing each frame to the chip whose line is asserted.
pub struct SimBus {
    lines: Lines,
    chips: BTreeMap<u8, Chip>,
}

impl SimBus {
    pub fn new(lines: Lines) -> Self {
        Self {
            lines,
            chips: BTreeMap::new(),
        }
    }

    pub fn add_adc(&mut self, line: u8) {
        self.chips.insert(line, Chip::Adc(SimAdc::new()));
    }

    pub fn add_pot(&mut self, line: u8) {
        self.chips.insert(line, Chip::Pot(SimPot { wiper: 0x3F }));
    }

    fn exchange(&mut self, words: &mut [u8]) {
        let Some(line) = self.lines.selected.get() else {
            log::error!("frame clocked with no chip-select asserted");
            words.fill(0xFF);
            return;
        };

        if words.len() != 2 {
            log::warn!("line {line}: nothing answers a {}-byte frame", words.len());
            words.fill(0xFF);
            return;
        }

        let Some(chip) = self.chips.get_mut(&line) else {
            log::warn!("line {line}: no chip fitted");
            words.fill(0xFF);
            return;
        };

        let reply = chip.frame(u16::from_be_bytes([words[0], words[1]]));

        words.copy_from_slice(&reply.to_be_bytes());
    }
}

impl ErrorType for SimBus {
    type Error = Infallible;
}

impl SpiBus for SimBus {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        words.fill(0);
        self.exchange(words);
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        let mut scratch = words.to_vec();

        self.exchange(&mut scratch);

        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let len = read.len().min(write.len());

        read[..len].copy_from_slice(&write[..len]);
        self.exchange(&mut read[..len]);

        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.exchange(words);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
