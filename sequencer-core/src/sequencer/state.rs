//! Sequencer states and the dwell-expiry transition table.

use core::fmt;

use crate::ports::Level;

/// Dwell phases of the press/hold/release pulse train.
///
/// `Down*` states pull the drive line low, every other state releases it high.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerState {
    /// Waiting for a press edge.
    Idle,
    /// Drive low for 1 ms.
    Down1,
    /// Drive high for 1 ms.
    Up1,
    /// Drive low for 10 ms.
    Down10,
    /// Drive high for 5 ms.
    Up5,
    /// Drive low for 15 ms.
    Down15,
    /// Drive high until the button is released.
    Wait,
    /// Drive low for 2 ms after a release seen in [`PowerState::Wait`].
    Down2,
}

/// Number of distinct [`PowerState`] variants.
pub const POWER_STATE_COUNT: usize = 8;

/// Every state in declaration order.
pub const ALL_STATES: [PowerState; POWER_STATE_COUNT] = [
    PowerState::Idle,
    PowerState::Down1,
    PowerState::Up1,
    PowerState::Down10,
    PowerState::Up5,
    PowerState::Down15,
    PowerState::Wait,
    PowerState::Down2,
];

impl PowerState {
    /// Deterministic index for lookups into [`ALL_STATES`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            PowerState::Idle => 0,
            PowerState::Down1 => 1,
            PowerState::Up1 => 2,
            PowerState::Down10 => 3,
            PowerState::Up5 => 4,
            PowerState::Down15 => 5,
            PowerState::Wait => 6,
            PowerState::Down2 => 7,
        }
    }

    /// Attempts to construct a [`PowerState`] from a raw index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < POWER_STATE_COUNT {
            Some(ALL_STATES[index])
        } else {
            None
        }
    }

    /// Level written to the drive line on entry.
    #[must_use]
    pub const fn drive_level(self) -> Level {
        match self {
            PowerState::Down1 | PowerState::Down10 | PowerState::Down15 | PowerState::Down2 => {
                Level::Low
            }
            PowerState::Idle | PowerState::Up1 | PowerState::Up5 | PowerState::Wait => Level::High,
        }
    }

    /// Slot in the dwell table, or `None` for states that wait on an edge.
    #[must_use]
    pub const fn timed_index(self) -> Option<usize> {
        match self {
            PowerState::Down1 => Some(0),
            PowerState::Up1 => Some(1),
            PowerState::Down10 => Some(2),
            PowerState::Up5 => Some(3),
            PowerState::Down15 => Some(4),
            PowerState::Down2 => Some(5),
            PowerState::Idle | PowerState::Wait => None,
        }
    }

    /// Returns `true` for states that leave on a button edge rather than a timeout.
    #[must_use]
    pub const fn awaits_edge(self) -> bool {
        self.timed_index().is_none()
    }

    /// Next state once this state's dwell expires.
    ///
    /// `button` is the sense line sampled at expiry; it only matters at the end
    /// of `Down15`, where a released (high) button skips [`PowerState::Wait`].
    /// Returns `None` for `Idle` and `Wait`, which never arm the timer.
    #[must_use]
    pub const fn after_dwell(self, button: Level) -> Option<Self> {
        match self {
            PowerState::Idle | PowerState::Wait => None,
            PowerState::Down1 => Some(PowerState::Up1),
            PowerState::Up1 => Some(PowerState::Down10),
            PowerState::Down10 => Some(PowerState::Up5),
            PowerState::Up5 => Some(PowerState::Down15),
            PowerState::Down15 => match button {
                Level::High => Some(PowerState::Idle),
                Level::Low => Some(PowerState::Wait),
            },
            PowerState::Down2 => Some(PowerState::Idle),
        }
    }

    /// Short lowercase label used by logs and the console.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            PowerState::Idle => "idle",
            PowerState::Down1 => "down1",
            PowerState::Up1 => "up1",
            PowerState::Down10 => "down10",
            PowerState::Up5 => "up5",
            PowerState::Down15 => "down15",
            PowerState::Wait => "wait",
            PowerState::Down2 => "down2",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_lookup_is_stable() {
        for (index, state) in ALL_STATES.iter().enumerate() {
            assert_eq!(state.as_index(), index);
            assert_eq!(PowerState::from_index(index), Some(*state));
        }
        assert_eq!(PowerState::from_index(POWER_STATE_COUNT), None);
    }

    #[test]
    fn down_states_pull_the_line_low() {
        assert_eq!(PowerState::Down1.drive_level(), Level::Low);
        assert_eq!(PowerState::Down2.drive_level(), Level::Low);
        assert_eq!(PowerState::Up5.drive_level(), Level::High);
        assert_eq!(PowerState::Wait.drive_level(), Level::High);
        assert_eq!(PowerState::Idle.drive_level(), Level::High);
    }

    #[test]
    fn dwell_expiry_walks_the_pulse_train() {
        let mut state = PowerState::Down1;
        let mut visited = [PowerState::Idle; 5];
        for slot in &mut visited {
            *slot = state;
            state = state.after_dwell(Level::Low).expect("timed state");
        }
        assert_eq!(
            visited,
            [
                PowerState::Down1,
                PowerState::Up1,
                PowerState::Down10,
                PowerState::Up5,
                PowerState::Down15,
            ]
        );
        assert_eq!(state, PowerState::Wait);
    }

    #[test]
    fn down15_branches_on_button_level() {
        assert_eq!(
            PowerState::Down15.after_dwell(Level::High),
            Some(PowerState::Idle)
        );
        assert_eq!(
            PowerState::Down15.after_dwell(Level::Low),
            Some(PowerState::Wait)
        );
    }

    #[test]
    fn edge_states_ignore_expiry() {
        assert_eq!(PowerState::Idle.after_dwell(Level::Low), None);
        assert_eq!(PowerState::Wait.after_dwell(Level::High), None);
        assert!(PowerState::Wait.awaits_edge());
        assert!(!PowerState::Down2.awaits_edge());
    }
}
