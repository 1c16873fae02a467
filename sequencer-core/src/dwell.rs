//! Dwell-time table for the pulse train.
//!
//! Each timed state arms the countdown for its nominal dwell minus a fixed
//! compensation. The compensation values were measured on the reference
//! board's interrupt path so the wall-clock width of every pulse lands on the
//! nominal value. They are calibration data for that board and must be
//! re-measured on a new target rather than assumed portable.

use core::fmt;
use core::time::Duration;

use crate::sequencer::PowerState;

/// Nominal width of the first low pulse.
pub const DOWN1_NOMINAL: Duration = Duration::from_micros(1_000);
/// Measured latency trimmed from the `Down1` countdown.
pub const DOWN1_COMPENSATION: Duration = Duration::from_micros(28);
/// Nominal width of the first high gap.
pub const UP1_NOMINAL: Duration = Duration::from_micros(1_000);
/// Measured latency trimmed from the `Up1` countdown.
pub const UP1_COMPENSATION: Duration = Duration::from_micros(28);
/// Nominal width of the 10 ms low pulse.
pub const DOWN10_NOMINAL: Duration = Duration::from_micros(10_000);
/// Measured latency trimmed from the `Down10` countdown.
pub const DOWN10_COMPENSATION: Duration = Duration::from_micros(228);
/// Nominal width of the 5 ms high gap.
pub const UP5_NOMINAL: Duration = Duration::from_micros(5_000);
/// Measured latency trimmed from the `Up5` countdown.
pub const UP5_COMPENSATION: Duration = Duration::from_micros(128);
/// Nominal width of the final 15 ms low pulse.
pub const DOWN15_NOMINAL: Duration = Duration::from_micros(15_000);
/// Measured latency trimmed from the `Down15` countdown.
pub const DOWN15_COMPENSATION: Duration = Duration::from_micros(328);
/// Nominal width of the release pulse emitted after a long hold.
pub const DOWN2_NOMINAL: Duration = Duration::from_micros(2_000);
/// Measured latency trimmed from the `Down2` countdown.
pub const DOWN2_COMPENSATION: Duration = Duration::from_micros(28);

/// Number of states that arm the dwell timer.
pub const TIMED_STATE_COUNT: usize = 6;

/// Countdown applied when entering a timed state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseStep {
    pub state: PowerState,
    pub nominal: Duration,
    pub compensation: Duration,
}

impl PulseStep {
    #[must_use]
    pub const fn new(state: PowerState, nominal: Duration, compensation: Duration) -> Self {
        Self {
            state,
            nominal,
            compensation,
        }
    }

    /// Value loaded into the countdown: nominal width minus compensation.
    #[must_use]
    pub const fn dwell(&self) -> Duration {
        self.nominal.saturating_sub(self.compensation)
    }

    /// Copy of this step with the compensation removed.
    #[must_use]
    pub const fn uncompensated(self) -> Self {
        Self {
            compensation: Duration::ZERO,
            ..self
        }
    }

    const fn is_calibrated(&self) -> bool {
        self.compensation.as_micros() < self.nominal.as_micros()
    }

    /// Checks that the step produces a usable countdown.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError`] when the nominal dwell is zero or the
    /// compensation is not below it.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.nominal.is_zero() {
            return Err(CalibrationError::ZeroDwell(self.state));
        }
        if !self.is_calibrated() {
            return Err(CalibrationError::CompensationExceedsNominal(self.state));
        }
        Ok(())
    }
}

/// Reasons a dwell table cannot drive the sequencer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CalibrationError {
    /// A slot holds a step for the wrong state.
    StateMismatch { slot: usize, state: PowerState },
    /// The nominal dwell is zero, which would leave the timer disarmed.
    ZeroDwell(PowerState),
    /// Compensation swallows the entire nominal dwell.
    CompensationExceedsNominal(PowerState),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::StateMismatch { slot, state } => {
                write!(f, "dwell slot {slot} holds a step for {state}")
            }
            CalibrationError::ZeroDwell(state) => write!(f, "{state} has a zero nominal dwell"),
            CalibrationError::CompensationExceedsNominal(state) => {
                write!(f, "{state} compensation is not below its nominal dwell")
            }
        }
    }
}

/// Countdown values for every timed state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DwellTable {
    steps: [PulseStep; TIMED_STATE_COUNT],
}

impl DwellTable {
    /// Builds a table from steps ordered by [`PowerState::timed_index`].
    #[must_use]
    pub const fn new(steps: [PulseStep; TIMED_STATE_COUNT]) -> Self {
        Self { steps }
    }

    /// Returns the step for `state`, if it is a timed state.
    #[must_use]
    pub const fn step(&self, state: PowerState) -> Option<PulseStep> {
        match state.timed_index() {
            Some(slot) => Some(self.steps[slot]),
            None => None,
        }
    }

    /// Returns the countdown armed on entry to `state`.
    #[must_use]
    pub const fn dwell(&self, state: PowerState) -> Option<Duration> {
        match self.step(state) {
            Some(step) => Some(step.dwell()),
            None => None,
        }
    }

    /// Returns the steps in table order.
    #[must_use]
    pub const fn steps(&self) -> &[PulseStep] {
        &self.steps
    }

    /// Copy of the table with every compensation removed.
    #[must_use]
    pub const fn nominal(&self) -> Self {
        let mut steps = self.steps;
        let mut slot = 0;
        while slot < TIMED_STATE_COUNT {
            steps[slot] = steps[slot].uncompensated();
            slot += 1;
        }
        Self { steps }
    }

    const fn is_consistent(&self) -> bool {
        let mut slot = 0;
        while slot < TIMED_STATE_COUNT {
            let step = &self.steps[slot];
            match step.state.timed_index() {
                Some(expected) if expected == slot => {}
                _ => return false,
            }
            if step.nominal.is_zero() || !step.is_calibrated() {
                return false;
            }
            slot += 1;
        }
        true
    }

    /// Checks slot ordering and every step's calibration.
    ///
    /// # Errors
    ///
    /// Returns the first [`CalibrationError`] found, in slot order.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        for (slot, step) in self.steps.iter().enumerate() {
            if step.state.timed_index() != Some(slot) {
                return Err(CalibrationError::StateMismatch {
                    slot,
                    state: step.state,
                });
            }
            step.validate()?;
        }
        Ok(())
    }

    /// Time from the press edge to the end of `Down15` with no interference.
    #[must_use]
    pub fn train_length(&self) -> Duration {
        [
            PowerState::Down1,
            PowerState::Up1,
            PowerState::Down10,
            PowerState::Up5,
            PowerState::Down15,
        ]
        .iter()
        .filter_map(|state| self.dwell(*state))
        .sum()
    }
}

/// Table calibrated for the reference board's interrupt latency.
pub const CALIBRATED_TABLE: DwellTable = DwellTable::new([
    PulseStep::new(PowerState::Down1, DOWN1_NOMINAL, DOWN1_COMPENSATION),
    PulseStep::new(PowerState::Up1, UP1_NOMINAL, UP1_COMPENSATION),
    PulseStep::new(PowerState::Down10, DOWN10_NOMINAL, DOWN10_COMPENSATION),
    PulseStep::new(PowerState::Up5, UP5_NOMINAL, UP5_COMPENSATION),
    PulseStep::new(PowerState::Down15, DOWN15_NOMINAL, DOWN15_COMPENSATION),
    PulseStep::new(PowerState::Down2, DOWN2_NOMINAL, DOWN2_COMPENSATION),
]);

/// Table with no latency compensation.
pub const NOMINAL_TABLE: DwellTable = CALIBRATED_TABLE.nominal();

const _: () = assert!(CALIBRATED_TABLE.is_consistent());
const _: () = assert!(NOMINAL_TABLE.is_consistent());

#[cfg(test)]
mod tests {
    use super::*;

    fn micros(state: PowerState) -> u128 {
        CALIBRATED_TABLE
            .dwell(state)
            .expect("timed state")
            .as_micros()
    }

    #[test]
    fn calibrated_dwells_subtract_compensation() {
        assert_eq!(micros(PowerState::Down1), 972);
        assert_eq!(micros(PowerState::Up1), 972);
        assert_eq!(micros(PowerState::Down10), 9_772);
        assert_eq!(micros(PowerState::Up5), 4_872);
        assert_eq!(micros(PowerState::Down15), 14_672);
        assert_eq!(micros(PowerState::Down2), 1_972);
    }

    #[test]
    fn edge_states_have_no_dwell() {
        assert_eq!(CALIBRATED_TABLE.dwell(PowerState::Idle), None);
        assert_eq!(CALIBRATED_TABLE.dwell(PowerState::Wait), None);
    }

    #[test]
    fn nominal_table_drops_compensation() {
        assert_eq!(
            NOMINAL_TABLE.dwell(PowerState::Down10),
            Some(Duration::from_millis(10))
        );
        assert_eq!(
            NOMINAL_TABLE.train_length(),
            Duration::from_millis(1 + 1 + 10 + 5 + 15)
        );
        assert_eq!(CALIBRATED_TABLE.train_length(), Duration::from_micros(31_260));
    }

    #[test]
    fn validate_flags_misordered_slots() {
        let mut steps = [PulseStep::new(
            PowerState::Down1,
            DOWN1_NOMINAL,
            DOWN1_COMPENSATION,
        ); TIMED_STATE_COUNT];
        steps.copy_from_slice(CALIBRATED_TABLE.steps());
        steps.swap(0, 1);

        assert_eq!(
            DwellTable::new(steps).validate(),
            Err(CalibrationError::StateMismatch {
                slot: 0,
                state: PowerState::Up1,
            })
        );
        assert_eq!(CALIBRATED_TABLE.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_oversized_compensation() {
        let step = PulseStep::new(
            PowerState::Up5,
            Duration::from_micros(100),
            Duration::from_micros(100),
        );
        assert_eq!(
            step.validate(),
            Err(CalibrationError::CompensationExceedsNominal(PowerState::Up5))
        );

        let zero = PulseStep::new(PowerState::Down2, Duration::ZERO, Duration::ZERO);
        assert_eq!(
            zero.validate(),
            Err(CalibrationError::ZeroDwell(PowerState::Down2))
        );
    }
}
