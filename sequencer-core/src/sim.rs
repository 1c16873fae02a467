//! Simulated board for host tests and the emulator.
//!
//! The fakes model the register-level behaviour the sequencer depends on: the
//! button latches an edge flag only while its interrupt is unmasked, reading
//! the pending flags clears them, and the timer counts 1 µs ticks on a
//! virtual clock. Interrupts are dispatched with zero latency, so every
//! measured dwell equals the countdown that was loaded.

use core::fmt;
use core::ops::Add;
use core::time::Duration;

use heapless::{Deque, HistoryBuf};

use crate::ports::{ButtonSense, DriveLine, DwellTimer, EdgeFlags, Level, countdown_ticks};
use crate::sequencer::{Dispatch, PowerSequencer, PowerState, SequencerConfig, Transition};
use crate::telemetry::TelemetryInstant;

/// Number of drive-line changes kept for inspection.
pub const WAVEFORM_CAPACITY: usize = 64;
/// Number of dispatches buffered until [`SimBoard::pop_dispatch`] drains them.
pub const DISPATCH_CAPACITY: usize = 32;

/// Virtual microsecond timestamp.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(u64);

impl SimInstant {
    /// Start of the simulation.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl TelemetryInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for SimInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// Fake drive line counting every write.
#[derive(Clone, Debug)]
pub struct SimDrive {
    level: Level,
    writes: u32,
    configured: bool,
}

impl SimDrive {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            level: Level::High,
            writes: 0,
            configured: false,
        }
    }

    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Number of writes, including writes of an unchanged level.
    #[must_use]
    pub const fn writes(&self) -> u32 {
        self.writes
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.configured
    }
}

impl Default for SimDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveLine for SimDrive {
    fn configure(&mut self) {
        self.configured = true;
    }

    fn set_level(&mut self, level: Level) {
        self.level = level;
        self.writes = self.writes.saturating_add(1);
    }
}

/// Fake pulled-up button on a port shared with other edge-sensitive pins.
#[derive(Clone, Debug)]
pub struct SimButton {
    level: Level,
    pending: EdgeFlags,
    interrupt_enabled: bool,
    pulled_up: bool,
}

impl SimButton {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            level: Level::High,
            pending: EdgeFlags::NONE,
            interrupt_enabled: false,
            pulled_up: false,
        }
    }

    /// Moves the physical pin, latching an edge if the level changed.
    pub fn set_level(&mut self, level: Level) {
        if level == self.level {
            return;
        }
        self.level = level;
        if self.interrupt_enabled {
            self.pending = self.pending.union(EdgeFlags::BUTTON);
        }
    }

    /// Latches flags belonging to neighbouring pins.
    pub fn raise(&mut self, flags: EdgeFlags) {
        self.pending = self.pending.union(flags);
    }

    #[must_use]
    pub const fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    #[must_use]
    pub const fn pending(&self) -> EdgeFlags {
        self.pending
    }

    #[must_use]
    pub const fn interrupt_enabled(&self) -> bool {
        self.interrupt_enabled
    }

    #[must_use]
    pub const fn is_pulled_up(&self) -> bool {
        self.pulled_up
    }
}

impl Default for SimButton {
    fn default() -> Self {
        Self::new()
    }
}

impl ButtonSense for SimButton {
    fn configure(&mut self) {
        self.pulled_up = true;
    }

    fn level(&self) -> Level {
        self.level
    }

    fn take_pending(&mut self) -> EdgeFlags {
        core::mem::take(&mut self.pending)
    }

    fn enable_interrupt(&mut self) {
        self.interrupt_enabled = true;
    }
}

/// Fake one-shot countdown on the virtual clock.
#[derive(Clone, Debug)]
pub struct SimTimer {
    now: SimInstant,
    deadline: Option<SimInstant>,
    loaded: u32,
    pending: bool,
    starts: u32,
    configured: bool,
}

impl SimTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: SimInstant::ZERO,
            deadline: None,
            loaded: 0,
            pending: false,
            starts: 0,
            configured: false,
        }
    }

    /// Moves the timer's view of the clock; called before every dispatch.
    pub fn sync(&mut self, now: SimInstant) {
        self.now = now;
    }

    /// Expiry instant of the running countdown.
    #[must_use]
    pub const fn deadline(&self) -> Option<SimInstant> {
        self.deadline
    }

    /// Countdown value last loaded, in ticks.
    #[must_use]
    pub const fn loaded(&self) -> u32 {
        self.loaded
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    /// Number of times the countdown was started.
    #[must_use]
    pub const fn starts(&self) -> u32 {
        self.starts
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.configured
    }

    /// Reaches zero: the one-shot stops and latches its expiry flag.
    pub fn fire(&mut self) {
        self.deadline = None;
        self.pending = true;
    }
}

impl Default for SimTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl DwellTimer for SimTimer {
    fn configure(&mut self) {
        self.configured = true;
    }

    fn start(&mut self, dwell: Duration) {
        self.stop();
        self.loaded = countdown_ticks(dwell);
        self.deadline = Some(self.now + Duration::from_micros(u64::from(self.loaded)));
        self.starts = self.starts.saturating_add(1);
    }

    fn stop(&mut self) {
        self.deadline = None;
        self.pending = false;
    }

    fn acknowledge(&mut self) {
        self.pending = false;
    }
}

/// Sequencer wired to the simulated peripherals.
pub type SimSequencer = PowerSequencer<SimDrive, SimButton, SimTimer>;

/// Drive-line level entered at a point in virtual time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WaveformEdge {
    pub at: SimInstant,
    pub state: PowerState,
    pub level: Level,
}

/// Dispatch stamped with the virtual time it ran at.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimedDispatch {
    pub at: SimInstant,
    pub dispatch: Dispatch,
}

/// Simulated board: sequencer, fakes and a virtual microsecond clock.
pub struct SimBoard {
    sequencer: SimSequencer,
    now: SimInstant,
    waveform: HistoryBuf<WaveformEdge, WAVEFORM_CAPACITY>,
    dispatches: Deque<TimedDispatch, DISPATCH_CAPACITY>,
    dropped: u32,
}

impl SimBoard {
    /// Creates an unpowered board.
    #[must_use]
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            sequencer: PowerSequencer::new(
                SimDrive::new(),
                SimButton::new(),
                SimTimer::new(),
                config,
            ),
            now: SimInstant::ZERO,
            waveform: HistoryBuf::new(),
            dispatches: Deque::new(),
            dropped: 0,
        }
    }

    /// Creates a board and runs the sequencer's initialisation.
    #[must_use]
    pub fn powered(config: SequencerConfig) -> Self {
        let mut board = Self::new(config);
        board.power_on();
        board
    }

    /// Runs [`PowerSequencer::init`] at the current virtual time.
    pub fn power_on(&mut self) -> Transition {
        self.sequencer.timer_mut().sync(self.now);
        let transition = self.sequencer.init();
        self.record(Dispatch::Entered(transition));
        transition
    }

    #[must_use]
    pub const fn now(&self) -> SimInstant {
        self.now
    }

    #[must_use]
    pub const fn sequencer(&self) -> &SimSequencer {
        &self.sequencer
    }

    #[must_use]
    pub const fn state(&self) -> PowerState {
        self.sequencer.state()
    }

    #[must_use]
    pub fn drive_level(&self) -> Level {
        self.sequencer.drive().level()
    }

    #[must_use]
    pub fn button_level(&self) -> Level {
        self.sequencer.button().level()
    }

    /// Expiry instant of the armed dwell, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<SimInstant> {
        self.sequencer.timer().deadline()
    }

    /// Pulls the button low.
    pub fn press(&mut self) -> Option<Dispatch> {
        self.set_button(Level::Low)
    }

    /// Lets the button float high.
    pub fn release(&mut self) -> Option<Dispatch> {
        self.set_button(Level::High)
    }

    /// Moves the button pin and services the edge interrupt if one latched.
    pub fn set_button(&mut self, level: Level) -> Option<Dispatch> {
        self.latch_button(level);
        self.service_pending_edge()
    }

    /// Moves the button pin, leaving any latched edge pending.
    pub fn latch_button(&mut self, level: Level) {
        self.sequencer.button_mut().set_level(level);
    }

    /// Runs the armed countdown to zero and latches its expiry without
    /// servicing it. Returns `false` when no dwell is armed.
    pub fn latch_expiry(&mut self) -> bool {
        let Some(deadline) = self.deadline() else {
            return false;
        };
        self.now = deadline;
        let timer = self.sequencer.timer_mut();
        timer.sync(deadline);
        timer.fire();
        true
    }

    /// Services a latched edge interrupt, if any.
    pub fn service_pending_edge(&mut self) -> Option<Dispatch> {
        if !self.sequencer.button().has_pending() {
            return None;
        }
        self.sequencer.timer_mut().sync(self.now);
        let dispatch = self.sequencer.on_edge_interrupt();
        self.record(dispatch);
        Some(dispatch)
    }

    /// Services a latched timer expiry, if any.
    pub fn service_expiry(&mut self) -> Option<Dispatch> {
        if !self.sequencer.timer().is_pending() {
            return None;
        }
        self.sequencer.timer_mut().sync(self.now);
        let dispatch = self.sequencer.on_timer_interrupt();
        self.record(dispatch);
        Some(dispatch)
    }

    /// Latches edge flags for other pins on the button's port.
    pub fn raise_foreign_edge(&mut self, flags: EdgeFlags) -> Option<Dispatch> {
        self.sequencer.button_mut().raise(flags);
        self.service_pending_edge()
    }

    /// Toggles the button `transitions` times, `gap` apart, letting the clock run between toggles.
    pub fn bounce(&mut self, transitions: u8, gap: Duration) {
        for index in 0..transitions {
            if index > 0 {
                self.advance(gap);
            }
            let next = self.button_level().toggled();
            self.set_button(next);
        }
    }

    /// Advances the clock by `span`, firing every dwell that expires on the way.
    pub fn advance(&mut self, span: Duration) {
        let target = self.now + span;
        while let Some(deadline) = self.deadline() {
            if deadline > target {
                break;
            }
            self.now = deadline;
            self.expire();
        }
        self.now = target;
    }

    /// Fires armed dwells back to back until the timer is idle or `limit` passes.
    ///
    /// Returns `true` when the sequencer settled with no dwell armed.
    pub fn run_until_quiet(&mut self, limit: Duration) -> bool {
        let stop_at = self.now + limit;
        while let Some(deadline) = self.deadline() {
            if deadline > stop_at {
                return false;
            }
            self.now = deadline;
            self.expire();
        }
        true
    }

    /// Drive-line history, oldest first.
    pub fn waveform(&self) -> impl Iterator<Item = &WaveformEdge> + '_ {
        self.waveform.oldest_ordered()
    }

    /// Forgets recorded waveform edges.
    pub fn clear_waveform(&mut self) {
        self.waveform.clear();
    }

    /// Removes the oldest undrained dispatch.
    pub fn pop_dispatch(&mut self) -> Option<TimedDispatch> {
        self.dispatches.pop_front()
    }

    /// Returns and resets the number of dispatches evicted from a full queue.
    pub fn take_dropped(&mut self) -> u32 {
        core::mem::take(&mut self.dropped)
    }

    fn expire(&mut self) {
        if self.latch_expiry() {
            self.service_expiry();
        }
    }

    fn record(&mut self, dispatch: Dispatch) {
        if let Some(transition) = dispatch.transition() {
            self.waveform.write(WaveformEdge {
                at: self.now,
                state: transition.to,
                level: transition.drive,
            });
        }

        let entry = TimedDispatch {
            at: self.now,
            dispatch,
        };
        if self.dispatches.is_full() {
            self.dispatches.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
        let _ = self.dispatches.push_back(entry);
    }
}
