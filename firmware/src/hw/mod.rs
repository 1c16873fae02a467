//! STM32G0 bindings for the sequencer ports.
//!
//! The button sits on PA0 behind EXTI0 with the internal pull-up enabled, the
//! drive line is PA3 in open-drain mode, and the dwell countdown is an Embassy
//! timer deadline serviced by the sequencer task.

use core::time::Duration;

use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::OutputOpenDrain;
use embassy_time::{Duration as EmbassyDuration, Instant};
use sequencer_core::ports::{
    ButtonSense, DriveLine, DwellTimer, EdgeFlags, Level, countdown_ticks,
};
use sequencer_core::sequencer::PowerSequencer;

/// Sequencer wired to the board peripherals.
pub type BoardSequencer<'d> = PowerSequencer<BoardDrive<'d>, BoardButton<'d>, BoardTimer>;

/// Open-drain output pulled low for the `Down*` pulses.
pub struct BoardDrive<'d> {
    output: OutputOpenDrain<'d>,
}

impl<'d> BoardDrive<'d> {
    #[must_use]
    pub fn new(output: OutputOpenDrain<'d>) -> Self {
        Self { output }
    }
}

impl DriveLine for BoardDrive<'_> {
    fn set_level(&mut self, level: Level) {
        match level {
            Level::Low => self.output.set_low(),
            Level::High => self.output.set_high(),
        }
    }
}

/// Button input with an EXTI line. Edges latch only after the sequencer
/// unmasks the interrupt.
pub struct BoardButton<'d> {
    input: ExtiInput<'d>,
    pending: EdgeFlags,
    unmasked: bool,
}

impl<'d> BoardButton<'d> {
    #[must_use]
    pub fn new(input: ExtiInput<'d>) -> Self {
        Self {
            input,
            pending: EdgeFlags::NONE,
            unmasked: false,
        }
    }

    /// Waits for either edge and latches it.
    pub async fn wait_for_edge(&mut self) {
        self.input.wait_for_any_edge().await;
        if self.unmasked {
            self.pending = self.pending.union(EdgeFlags::BUTTON);
        }
    }
}

impl ButtonSense for BoardButton<'_> {
    fn level(&self) -> Level {
        Level::from_high(self.input.is_high())
    }

    fn take_pending(&mut self) -> EdgeFlags {
        core::mem::take(&mut self.pending)
    }

    fn enable_interrupt(&mut self) {
        self.unmasked = true;
    }
}

/// One-shot countdown expressed as an Embassy deadline.
pub struct BoardTimer {
    deadline: Option<Instant>,
}

impl BoardTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Instant the armed dwell expires, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Called once the deadline passes; the countdown is one-shot.
    pub fn expire(&mut self) {
        self.deadline = None;
    }
}

impl Default for BoardTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl DwellTimer for BoardTimer {
    fn start(&mut self, dwell: Duration) {
        let ticks = countdown_ticks(dwell);
        self.deadline = Some(Instant::now() + EmbassyDuration::from_micros(u64::from(ticks)));
    }

    fn stop(&mut self) {
        self.deadline = None;
    }

    // Deadlines carry no status flag to clear.
    fn acknowledge(&mut self) {}
}
