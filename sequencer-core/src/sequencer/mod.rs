//! Interrupt-driven power button sequencer.
//!
//! A falling edge on the button while idle starts a fixed pulse train on the
//! drive line: 1 ms low, 1 ms high, 10 ms low, 5 ms high, 15 ms low. When the
//! train ends the button is sampled. A released button returns the machine to
//! idle; a button still held parks it in `Wait` until the release edge, which
//! emits one final 2 ms low pulse.
//!
//! Two interrupt sources feed the machine, the button edge and the dwell
//! timer expiry. Both entry points run inside a critical section and change
//! state only through `set_state`, which writes the drive level, arms or
//! disarms the timer and stores the new state as one unit. Interleaving is
//! therefore impossible even when the platform assigns both interrupts the
//! same priority.

use core::time::Duration;

use crate::dwell::{CALIBRATED_TABLE, DwellTable, NOMINAL_TABLE};
use crate::ports::{ButtonSense, DriveLine, DwellTimer, EdgeFlags, Level};

pub mod state;

pub use state::{ALL_STATES, POWER_STATE_COUNT, PowerState};

/// Runtime configuration for a [`PowerSequencer`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequencerConfig {
    table: DwellTable,
}

impl SequencerConfig {
    /// Creates a configuration using the provided dwell table.
    #[must_use]
    pub const fn new(table: DwellTable) -> Self {
        Self { table }
    }

    /// Configuration using the latency-compensated reference table.
    #[must_use]
    pub const fn calibrated() -> Self {
        Self::new(CALIBRATED_TABLE)
    }

    /// Configuration using nominal dwells with no compensation.
    #[must_use]
    pub const fn nominal() -> Self {
        Self::new(NOMINAL_TABLE)
    }

    /// Returns the configured dwell table.
    #[must_use]
    pub const fn table(&self) -> &DwellTable {
        &self.table
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self::calibrated()
    }
}

/// Event that moved the sequencer into a new state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransitionCause {
    /// Initial transition performed by [`PowerSequencer::init`].
    PowerOn,
    /// Falling edge on the button while idle.
    Press,
    /// Rising edge on the button while waiting.
    Release,
    /// The armed dwell elapsed.
    DwellExpired,
}

/// Why an interrupt left the state untouched.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IgnoreReason {
    /// Only flags for other pins on the button's port were pending.
    ForeignEdge,
    /// A button edge outside the two decision points; carries the sampled level.
    UnexpectedEdge(Level),
    /// Timer expiry while idle or waiting.
    StaleExpiry,
}

/// Completed state change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transition {
    pub from: PowerState,
    pub to: PowerState,
    pub cause: TransitionCause,
    pub drive: Level,
    pub dwell: Option<Duration>,
}

/// Result of feeding one interrupt into the sequencer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dispatch {
    Entered(Transition),
    Ignored {
        state: PowerState,
        reason: IgnoreReason,
    },
}

impl Dispatch {
    /// Returns the transition, if one happened.
    #[must_use]
    pub const fn transition(&self) -> Option<&Transition> {
        match self {
            Dispatch::Entered(transition) => Some(transition),
            Dispatch::Ignored { .. } => None,
        }
    }

    /// State the sequencer is in after handling the interrupt.
    #[must_use]
    pub const fn state_after(&self) -> PowerState {
        match self {
            Dispatch::Entered(transition) => transition.to,
            Dispatch::Ignored { state, .. } => *state,
        }
    }
}

/// Button sequencer owning its drive line, button sense line and dwell timer.
pub struct PowerSequencer<D, B, T> {
    drive: D,
    button: B,
    timer: T,
    config: SequencerConfig,
    state: PowerState,
    drive_level: Level,
    armed: Option<Duration>,
}

impl<D, B, T> PowerSequencer<D, B, T>
where
    D: DriveLine,
    B: ButtonSense,
    T: DwellTimer,
{
    /// Wraps the peripherals. Nothing is touched until [`PowerSequencer::init`].
    #[must_use]
    pub fn new(drive: D, button: B, timer: T, config: SequencerConfig) -> Self {
        Self {
            drive,
            button,
            timer,
            config,
            state: PowerState::Idle,
            drive_level: PowerState::Idle.drive_level(),
            armed: None,
        }
    }

    /// Configures the peripherals, enters `Idle` with the line released and no
    /// dwell running, then unmasks the button interrupt.
    pub fn init(&mut self) -> Transition {
        critical_section::with(|_| {
            self.drive.configure();
            self.button.configure();
            self.timer.configure();
            let transition = self.enter(PowerState::Idle, TransitionCause::PowerOn);
            self.button.enable_interrupt();
            transition
        })
    }

    /// Button edge interrupt entry point.
    pub fn on_edge_interrupt(&mut self) -> Dispatch {
        critical_section::with(|_| self.handle_edge())
    }

    /// Dwell timer expiry interrupt entry point.
    pub fn on_timer_interrupt(&mut self) -> Dispatch {
        critical_section::with(|_| self.handle_expiry())
    }

    fn handle_edge(&mut self) -> Dispatch {
        let pending = self.button.take_pending();
        if !pending.contains(EdgeFlags::BUTTON) {
            return self.ignored(IgnoreReason::ForeignEdge);
        }

        let level = self.button.level();
        match (level, self.state) {
            (Level::High, PowerState::Wait) => {
                Dispatch::Entered(self.enter(PowerState::Down2, TransitionCause::Release))
            }
            (Level::Low, PowerState::Idle) => {
                Dispatch::Entered(self.enter(PowerState::Down1, TransitionCause::Press))
            }
            _ => self.ignored(IgnoreReason::UnexpectedEdge(level)),
        }
    }

    fn handle_expiry(&mut self) -> Dispatch {
        self.timer.acknowledge();

        match self.state.after_dwell(self.button.level()) {
            Some(next) => Dispatch::Entered(self.enter(next, TransitionCause::DwellExpired)),
            None => self.ignored(IgnoreReason::StaleExpiry),
        }
    }

    fn ignored(&self, reason: IgnoreReason) -> Dispatch {
        Dispatch::Ignored {
            state: self.state,
            reason,
        }
    }

    fn enter(&mut self, next: PowerState, cause: TransitionCause) -> Transition {
        let from = self.state;
        let drive = next.drive_level();
        let dwell = self.config.table().dwell(next);
        self.set_state(next, drive, dwell);

        Transition {
            from,
            to: next,
            cause,
            drive,
            dwell: self.armed,
        }
    }

    // Sole mutation point: drive level, timer and state always change together.
    fn set_state(&mut self, next: PowerState, level: Level, dwell: Option<Duration>) {
        self.drive.set_level(level);
        self.drive_level = level;

        match dwell.filter(|dwell| !dwell.is_zero()) {
            Some(dwell) => {
                self.timer.start(dwell);
                self.armed = Some(dwell);
            }
            None => {
                self.timer.stop();
                self.armed = None;
            }
        }

        self.state = next;
    }
}

impl<D, B, T> PowerSequencer<D, B, T> {
    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PowerState {
        self.state
    }

    /// Level last written to the drive line.
    #[must_use]
    pub const fn drive_level(&self) -> Level {
        self.drive_level
    }

    /// Countdown armed by the last transition, if the timer is running.
    #[must_use]
    pub const fn armed_dwell(&self) -> Option<Duration> {
        self.armed
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SequencerConfig {
        &self.config
    }

    #[must_use]
    pub fn drive(&self) -> &D {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut D {
        &mut self.drive
    }

    #[must_use]
    pub fn button(&self) -> &B {
        &self.button
    }

    pub fn button_mut(&mut self) -> &mut B {
        &mut self.button
    }

    #[must_use]
    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// Releases the peripherals.
    #[must_use]
    pub fn into_parts(self) -> (D, B, T) {
        (self.drive, self.button, self.timer)
    }
}
