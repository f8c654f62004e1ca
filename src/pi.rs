//! Drives the peripherals of a CORE or PWL board from a Raspberry Pi.
//!
//! The board is picked with `PERIPHCTL_ROLE` (`core` or `pwl`, default `core`),
//! log output with `RUST_LOG`. Board chip-select numbers are used as BCM
//! lines, so a role whose chip-selects land on SPI0's pins is refused.

use std::time::Duration;

use ad7322::{Channel, Control, InputRange, Ranges, ReferenceSource, SequencerMode};
use embedded_hal::spi::{Phase, Polarity};
use periph::{BusSettings, DeviceId, Registry, Report, Role, SharedBus};
use rppal::gpio::Gpio;
use rppal::hal::Delay;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

const ROLE_VAR: &str = "PERIPHCTL_ROLE";

/// BCM lines of the Pi's SPI0: CE1, CE0, MISO, MOSI, SCLK.
const SPI0_PINS: [u8; 5] = [7, 8, 9, 10, 11];

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let role = match std::env::var(ROLE_VAR) {
        Ok(role) => role.parse()?,
        Err(_) => Role::Core,
    };
    let pinout = role.pinout();

    if let Some(pin) = pinout.first_conflict() {
        anyhow::bail!("pin {pin} is assigned twice on the {role:?} board");
    }

    // board chip-select numbers are used as BCM lines, so they must stay off SPI0
    if let Some((id, pin)) = pinout.chip_select_clash(&SPI0_PINS) {
        anyhow::bail!(
            "{id} chip-select GPIO {pin} is one of SPI0's own lines on the {role:?} board"
        );
    }

    let settings = BusSettings::default();
    let gpio = Gpio::new()?;

    // CE0 still toggles on every transfer; devices are selected by their own GPIO
    let spi = Spi::new(
        Bus::Spi0,
        SlaveSelect::Ss0,
        settings.clock_hz,
        mode(settings.mode),
    )?;

    let bus = SharedBus::new(spi);
    let mut board = Registry::new();

    for &(id, line) in pinout.chip_selects {
        let mut cs = gpio.get(line)?.into_output();

        cs.set_high();

        let device = bus.device(cs);

        if id.is_adc() {
            board.add_adc(id, device, Delay::new())?;
        } else {
            board.add_pot(id, device)?;
        }

        log::info!("{id} on GPIO {line}");
    }

    let adcs: Vec<DeviceId> = board.list_devices().filter(|id| id.is_adc()).collect();

    for &id in &adcs {
        let mut adc = board.acquire_adc(id)?;

        adc.write_range(Ranges {
            v0: InputRange::Bipolar10V,
            v1: InputRange::Bipolar10V,
        })?;
        adc.write(Control {
            reference: ReferenceSource::Internal,
            sequencer: SequencerMode::EnabledContiguous,
            ..Control::default().with_channel(Channel::V1)
        })?;
    }

    for id in board.list_devices().filter(|id| !id.is_adc()) {
        board.acquire_pot(id)?.set_wiper(max5437::MID_POSITION)?;
    }

    loop {
        for &id in &adcs {
            let reading = board.acquire_adc(id)?.transfer()?;

            let Some(report) = Report::new(id, &reading) else {
                continue;
            };

            match report.volts() {
                Ok(volts) if !report.stale => {
                    log::info!("{id} {:?}: {volts:+.3} V", report.channel)
                }
                Ok(_) => log::debug!("{id}: dropped stale sample"),
                Err(err) => log::warn!("{id}: {err}"),
            }
        }

        std::thread::sleep(Duration::from_millis(100));
    }
}

fn mode(mode: embedded_hal::spi::Mode) -> Mode {
    match (mode.polarity, mode.phase) {
        (Polarity::IdleLow, Phase::CaptureOnFirstTransition) => Mode::Mode0,
        (Polarity::IdleLow, Phase::CaptureOnSecondTransition) => Mode::Mode1,
        (Polarity::IdleHigh, Phase::CaptureOnFirstTransition) => Mode::Mode2,
        (Polarity::IdleHigh, Phase::CaptureOnSecondTransition) => Mode::Mode3,
    }
}
