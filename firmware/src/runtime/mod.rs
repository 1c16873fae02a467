use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, OutputOpenDrain, Pull, Speed};
use sequencer_core::sequencer::{PowerSequencer, SequencerConfig};

use crate::hw::{BoardButton, BoardDrive, BoardTimer};
use crate::telemetry::TelemetryRecorder;

mod sequencer_task;
mod status_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals { PA0, PA3, EXTI0, .. } = hal::init(config);

    let drive = BoardDrive::new(OutputOpenDrain::new(PA3, Level::High, Speed::Low));
    let button = BoardButton::new(ExtiInput::new(PA0, EXTI0, Pull::Up));
    let sequencer = PowerSequencer::new(
        drive,
        button,
        BoardTimer::new(),
        SequencerConfig::calibrated(),
    );

    defmt::info!(
        "power sequencer: train length {}us",
        u64::try_from(sequencer.config().table().train_length().as_micros()).unwrap_or(u64::MAX)
    );

    spawner
        .spawn(sequencer_task::run(sequencer, TelemetryRecorder::new()))
        .expect("failed to spawn sequencer task");

    spawner
        .spawn(status_task::run())
        .expect("failed to spawn status task");

    core::future::pending::<()>().await;
}
