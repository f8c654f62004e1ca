//! Drives the CORE board's peripherals against a simulated SPI bus, so the
//! control flow can be exercised without the hardware.

mod sim;

use ad7322::{
    Channel, Coding, Control, InputRange, PowerMode, Ranges, Reading, ReferenceSource,
    SequencerMode,
};
use periph::pinout::CORE;
use periph::{BusDevice, DeviceId, Registry, Report, SharedBus};

use sim::{Lines, SimBus, SimDelay, SimPin};

type Board<'a> = Registry<BusDevice<'a, SimBus, SimPin>, SimDelay>;

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let lines = Lines::default();
    let mut chips = SimBus::new(lines.clone());

    for &(id, line) in CORE.chip_selects {
        if id.is_adc() {
            chips.add_adc(line);
        } else {
            chips.add_pot(line);
        }
    }

    let bus = SharedBus::new(chips);
    let mut board = Registry::new();

    for &(id, line) in CORE.chip_selects {
        let device = bus.device(SimPin::new(line, lines.clone()));

        if id.is_adc() {
            board.add_adc(id, device, SimDelay)?;
        } else {
            board.add_pot(id, device)?;
        }
    }

    for id in board.list_devices() {
        log::info!("{id} on line {:?}", CORE.chip_select(id));
    }

    // XY alternates both channels at ±5 V, two's complement
    sample(
        &board,
        DeviceId::AdcXy,
        Ranges {
            v0: InputRange::Bipolar5V,
            v1: InputRange::Bipolar5V,
        },
        Control {
            reference: ReferenceSource::Internal,
            sequencer: SequencerMode::EnabledContiguous,
            ..Control::default().with_channel(Channel::V1)
        },
        6,
    )?;

    // ZW watches V0 alone at 0-10 V, straight binary
    sample(
        &board,
        DeviceId::AdcZw,
        Ranges {
            v0: InputRange::Unipolar10V,
            v1: InputRange::Bipolar10V,
        },
        Control {
            coding: Coding::StraightBinary,
            reference: ReferenceSource::Internal,
            ..Control::default().with_channel(Channel::V0)
        },
        3,
    )?;

    // in autoshutdown ZW powers down after each conversion, so every frame waits
    {
        let mut adc = board.acquire_adc(DeviceId::AdcZw)?;
        let control = Control {
            power: PowerMode::AutoShutdown,
            ..adc.pending_control()
        };

        report(DeviceId::AdcZw, &adc.write(control)?);

        for _ in 0..3 {
            report(DeviceId::AdcZw, &adc.transfer()?);
        }
    }

    for id in [DeviceId::RdigIc, DeviceId::Rdig1, DeviceId::Rdig2] {
        let mut pot = board.acquire_pot(id)?;

        pot.set_wiper(max5437::MID_POSITION)?;
        log::info!("{id} wiper at {:?}", pot.wiper());

        if let Err(err) = pot.set_wiper(max5437::MAX_POSITION + 1) {
            log::warn!("{id}: {err}");
        }
    }

    if lines.overlaps() > 0 {
        anyhow::bail!("{} overlapping chip-selects", lines.overlaps());
    }

    Ok(())
}

fn sample(
    board: &Board<'_>,
    id: DeviceId,
    ranges: Ranges,
    control: Control,
    frames: usize,
) -> Result<(), anyhow::Error> {
    let mut adc = board.acquire_adc(id)?;

    report(id, &adc.write_range(ranges)?);
    report(id, &adc.write(control)?);

    for _ in 0..frames {
        report(id, &adc.transfer()?);
    }

    log::info!("{id} is {:?}", adc.state());

    Ok(())
}

fn report(id: DeviceId, reading: &Reading) {
    let Some(report) = Report::new(id, reading) else {
        log::info!("{id}: nothing settled yet");
        return;
    };

    let stale = if report.stale { " (stale)" } else { "" };

    match report.volts() {
        Ok(volts) => log::info!(
            "{id} {:?}: {volts:+.3} V{stale}, link {:02x?}",
            report.channel,
            report.to_be_bytes()
        ),
        Err(err) => log::warn!("{id}: {err}"),
    }
}
