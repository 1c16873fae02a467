//! Interrupt dispatch loop.
//!
//! The task stands in for the two interrupt vectors: a button edge wakes it
//! through EXTI, the dwell deadline through the Embassy time driver. Whichever
//! fires first is fed into the matching sequencer entry point, which runs the
//! transition inside a critical section.

use embassy_futures::select::{Either, select};
use embassy_time::{Instant, Timer};
use sequencer_core::sequencer::Dispatch;

use crate::hw::BoardSequencer;
use crate::status;
use crate::telemetry::{FirmwareInstant, TelemetryRecorder};

#[embassy_executor::task]
pub async fn run(mut sequencer: BoardSequencer<'static>, mut telemetry: TelemetryRecorder) -> ! {
    let powered = sequencer.init();
    publish(&Dispatch::Entered(powered), &mut telemetry);

    loop {
        let deadline = sequencer.timer().deadline();
        // Edges are only latched while this wait is pending; one arriving during a dispatch is missed.
        let woke = select(
            sequencer.button_mut().wait_for_edge(),
            wait_for_expiry(deadline),
        )
        .await;

        let dispatch = match woke {
            Either::First(()) => sequencer.on_edge_interrupt(),
            Either::Second(()) => {
                sequencer.timer_mut().expire();
                sequencer.on_timer_interrupt()
            }
        };
        publish(&dispatch, &mut telemetry);
    }
}

async fn wait_for_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(at) => Timer::at(at).await,
        None => core::future::pending::<()>().await,
    }
}

fn publish(dispatch: &Dispatch, telemetry: &mut TelemetryRecorder) {
    status::record_dispatch(dispatch);
    telemetry.record_dispatch(dispatch, FirmwareInstant::from(Instant::now()));
}
