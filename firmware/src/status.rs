#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The sequencer task publishes its state and counters through atomics so the
//! heartbeat task can report them without borrowing the sequencer.

use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use sequencer_core::ports::Level;
use sequencer_core::sequencer::{Dispatch, IgnoreReason, PowerState, TransitionCause};

/// Index of the current [`PowerState`].
static STATE_INDEX: AtomicU8 = AtomicU8::new(0);
/// Level last written to the drive line.
static DRIVE_HIGH: AtomicBool = AtomicBool::new(true);
/// Number of state changes since boot.
static TRANSITIONS: AtomicU32 = AtomicU32::new(0);
/// Number of press edges that started a pulse train.
static TRAINS: AtomicU32 = AtomicU32::new(0);
/// Button edges that arrived outside a decision point.
static IGNORED_EDGES: AtomicU32 = AtomicU32::new(0);
/// Interrupts latched only by neighbouring pins.
static FOREIGN_EDGES: AtomicU32 = AtomicU32::new(0);
/// Expiries seen while no dwell was armed.
static STALE_EXPIRIES: AtomicU32 = AtomicU32::new(0);

/// Point-in-time copy of the published counters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: PowerState,
    pub drive: Level,
    pub transitions: u32,
    pub trains: u32,
    pub ignored_edges: u32,
    pub foreign_edges: u32,
    pub stale_expiries: u32,
}

#[allow(clippy::cast_possible_truncation)]
fn encode_state(state: PowerState) -> u8 {
    state.as_index() as u8
}

/// Publishes the outcome of one dispatch.
pub fn record_dispatch(dispatch: &Dispatch) {
    match dispatch {
        Dispatch::Entered(transition) => {
            STATE_INDEX.store(encode_state(transition.to), Ordering::Relaxed);
            DRIVE_HIGH.store(transition.drive.is_high(), Ordering::Relaxed);
            TRANSITIONS.fetch_add(1, Ordering::Relaxed);
            if transition.cause == TransitionCause::Press {
                TRAINS.fetch_add(1, Ordering::Relaxed);
            }
        }
        Dispatch::Ignored { reason, .. } => {
            let counter = match reason {
                IgnoreReason::ForeignEdge => &FOREIGN_EDGES,
                IgnoreReason::UnexpectedEdge(_) => &IGNORED_EDGES,
                IgnoreReason::StaleExpiry => &STALE_EXPIRIES,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Builds a [`StatusSnapshot`] from the stored values.
#[must_use]
pub fn snapshot() -> StatusSnapshot {
    let state = PowerState::from_index(usize::from(STATE_INDEX.load(Ordering::Relaxed)))
        .unwrap_or(PowerState::Idle);
    StatusSnapshot {
        state,
        drive: Level::from_high(DRIVE_HIGH.load(Ordering::Relaxed)),
        transitions: TRANSITIONS.load(Ordering::Relaxed),
        trains: TRAINS.load(Ordering::Relaxed),
        ignored_edges: IGNORED_EDGES.load(Ordering::Relaxed),
        foreign_edges: FOREIGN_EDGES.load(Ordering::Relaxed),
        stale_expiries: STALE_EXPIRIES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use sequencer_core::sequencer::Transition;

    #[test]
    fn press_updates_state_and_counters() {
        let before = snapshot();
        record_dispatch(&Dispatch::Entered(Transition {
            from: PowerState::Idle,
            to: PowerState::Down1,
            cause: TransitionCause::Press,
            drive: Level::Low,
            dwell: Some(Duration::from_micros(972)),
        }));
        record_dispatch(&Dispatch::Ignored {
            state: PowerState::Down1,
            reason: IgnoreReason::ForeignEdge,
        });

        let after = snapshot();
        assert_eq!(after.state, PowerState::Down1);
        assert_eq!(after.drive, Level::Low);
        assert!(after.trains > before.trains);
        assert!(after.foreign_edges > before.foreign_edges);
    }
}
