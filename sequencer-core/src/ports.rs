//! Hardware seams consumed by the power sequencer.
//!
//! The sequencer owns exactly three peripherals: the drive line it pulses,
//! the button sense line it watches, and a one-shot countdown that times each
//! dwell. Firmware binds these traits to real GPIO/EXTI/timer drivers while
//! tests and the emulator use the fakes in [`crate::sim`].

use core::fmt;
use core::time::Duration;

/// Logic level observed on, or driven onto, a GPIO line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Returns `true` for [`Level::High`].
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    /// Builds a level from a boolean "pin is high" reading.
    #[must_use]
    pub const fn from_high(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }

    /// Returns the opposite level.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => f.write_str("low"),
            Level::High => f.write_str("high"),
        }
    }
}

/// Edge-interrupt flags latched by the port that hosts the button.
///
/// The button shares its interrupt status register with other pins on the
/// same port, so a read can return bits the sequencer does not care about.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EdgeFlags(u8);

impl EdgeFlags {
    /// No edge pending.
    pub const NONE: Self = Self(0);
    /// Edge on the button sense pin.
    pub const BUTTON: Self = Self(1 << 0);

    /// Wraps a raw masked-interrupt-status value.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` when every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Returns `true` when no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Combines two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Resolution of the dwell countdown.
pub const TIMER_TICK: Duration = Duration::from_micros(1);

/// Converts a dwell into 1 µs countdown ticks, saturating at the 32-bit load limit.
#[must_use]
pub fn countdown_ticks(dwell: Duration) -> u32 {
    u32::try_from(dwell.as_micros()).unwrap_or(u32::MAX)
}

/// Output line pulsed by the sequencer.
pub trait DriveLine {
    /// Puts the line into output mode. Called once during initialisation.
    fn configure(&mut self) {}

    /// Drives the line to `level`.
    fn set_level(&mut self, level: Level);
}

/// Button input with a both-edge interrupt.
pub trait ButtonSense {
    /// Configures the pin as a pulled-up input, sensitive to both edges.
    /// The interrupt itself stays masked until [`ButtonSense::enable_interrupt`].
    fn configure(&mut self) {}

    /// Samples the current pin level.
    fn level(&self) -> Level;

    /// Reads the pending edge flags and clears exactly those bits.
    fn take_pending(&mut self) -> EdgeFlags;

    /// Unmasks the edge interrupt.
    fn enable_interrupt(&mut self) {}
}

/// One-shot microsecond countdown timing each dwell.
pub trait DwellTimer {
    /// Sets up a 32-bit, one-shot, count-down timer ticking every [`TIMER_TICK`]
    /// with its expiry interrupt unmasked. The timer is left stopped.
    fn configure(&mut self) {}

    /// Stops any running countdown, loads `dwell` and starts counting.
    fn start(&mut self, dwell: Duration);

    /// Stops the countdown and discards any pending expiry.
    fn stop(&mut self);

    /// Clears the expiry flags currently pending.
    fn acknowledge(&mut self);
}

/// Drive line that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopDriveLine;

impl NoopDriveLine {
    /// Creates a new no-op drive line.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DriveLine for NoopDriveLine {
    fn set_level(&mut self, _: Level) {}
}

/// Button that always reads released and never latches an edge.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopButton;

impl NoopButton {
    /// Creates a new no-op button.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ButtonSense for NoopButton {
    fn level(&self) -> Level {
        Level::High
    }

    fn take_pending(&mut self) -> EdgeFlags {
        EdgeFlags::NONE
    }
}

/// Timer that never expires.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopDwellTimer;

impl NoopDwellTimer {
    /// Creates a new no-op timer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DwellTimer for NoopDwellTimer {
    fn start(&mut self, _: Duration) {}

    fn stop(&mut self) {}

    fn acknowledge(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_flags_match_only_requested_bits() {
        let flags = EdgeFlags::from_bits(0b0110);
        assert!(!flags.contains(EdgeFlags::BUTTON));
        assert!(flags.union(EdgeFlags::BUTTON).contains(EdgeFlags::BUTTON));
        assert!(!EdgeFlags::NONE.contains(EdgeFlags::NONE));
        assert!(EdgeFlags::default().is_empty());
    }

    #[test]
    fn countdown_ticks_saturate_at_register_width() {
        assert_eq!(countdown_ticks(Duration::from_micros(972)), 972);
        assert_eq!(countdown_ticks(Duration::from_secs(10_000)), u32::MAX);
        assert_eq!(countdown_ticks(Duration::from_nanos(999)), 0);
    }

    #[test]
    fn level_helpers_round_trip() {
        assert_eq!(Level::from_high(true), Level::High);
        assert_eq!(Level::High.toggled(), Level::Low);
        assert!(!Level::Low.is_high());
    }
}
