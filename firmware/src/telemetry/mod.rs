//! Firmware telemetry: ring buffer plus defmt / stdout mirrors.
//!
//! Every dispatch the sequencer task produces is stored in the shared
//! `sequencer-core` recorder, stamped with Embassy's monotonic clock, and
//! echoed to the log so pulse timing can be checked over RTT during bring-up.

#![allow(dead_code)]

use core::time::Duration;

use embassy_time::Instant;
use sequencer_core::sequencer::{Dispatch, IgnoreReason, PowerState, Transition};
use sequencer_core::telemetry::{
    EventId, TelemetryInstant, TelemetryPayload, TelemetryRecorder as CoreRecorder,
};

/// Records retained on the MCU.
pub const FIRMWARE_TELEMETRY_CAPACITY: usize = 64;

/// Embassy instant usable as a telemetry timestamp.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[must_use]
    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        let elapsed = self.0.saturating_duration_since(earlier.0);
        Duration::from_micros(elapsed.as_micros())
    }
}

/// Telemetry ring bound to the firmware clock, mirroring each record to the log.
pub struct TelemetryRecorder {
    inner: CoreRecorder<FirmwareInstant, FIRMWARE_TELEMETRY_CAPACITY>,
}

impl TelemetryRecorder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: CoreRecorder::new(),
        }
    }

    /// Stores the dispatch and logs it.
    pub fn record_dispatch(&mut self, dispatch: &Dispatch, timestamp: FirmwareInstant) -> EventId {
        let id = self.inner.record_dispatch(dispatch, timestamp);
        let elapsed = self.inner.latest().and_then(|record| match record.details {
            TelemetryPayload::Transition(details) => details.elapsed_since_previous,
            TelemetryPayload::Ignored(_) | TelemetryPayload::None => None,
        });

        match dispatch {
            Dispatch::Entered(transition) => log_transition(transition, timestamp, elapsed),
            Dispatch::Ignored { state, reason } => log_ignored(*state, *reason, timestamp),
        }
        id
    }

    #[must_use]
    pub fn recorder(&self) -> &CoreRecorder<FirmwareInstant, FIRMWARE_TELEMETRY_CAPACITY> {
        &self.inner
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn log_transition(transition: &Transition, timestamp: FirmwareInstant, elapsed: Option<Duration>) {
    let dwell_us = transition.dwell.map(micros);
    let elapsed_us = elapsed.map(micros);
    emit_transition(
        transition.from.name(),
        transition.to.name(),
        level_label(transition.drive.is_high()),
        timestamp.as_micros(),
        dwell_us,
        elapsed_us,
    );
}

fn log_ignored(state: PowerState, reason: IgnoreReason, timestamp: FirmwareInstant) {
    emit_ignored(state.name(), reason_label(reason), timestamp.as_micros());
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(target_os = "none")]
fn emit_transition(
    from: &'static str,
    to: &'static str,
    level: &'static str,
    timestamp_us: u64,
    dwell_us: Option<u64>,
    elapsed_us: Option<u64>,
) {
    match (dwell_us, elapsed_us) {
        (Some(dwell), Some(delta)) => defmt::info!(
            "telemetry:sequencer {}->{} drive={} t={}us dwell={}us Δ={}us",
            from,
            to,
            level,
            timestamp_us,
            dwell,
            delta
        ),
        (Some(dwell), None) => defmt::info!(
            "telemetry:sequencer {}->{} drive={} t={}us dwell={}us",
            from,
            to,
            level,
            timestamp_us,
            dwell
        ),
        (None, Some(delta)) => defmt::info!(
            "telemetry:sequencer {}->{} drive={} t={}us Δ={}us",
            from,
            to,
            level,
            timestamp_us,
            delta
        ),
        (None, None) => defmt::info!(
            "telemetry:sequencer {}->{} drive={} t={}us",
            from,
            to,
            level,
            timestamp_us
        ),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_transition(
    from: &'static str,
    to: &'static str,
    level: &'static str,
    timestamp_us: u64,
    dwell_us: Option<u64>,
    elapsed_us: Option<u64>,
) {
    let dwell = dwell_us.map_or(String::new(), |dwell| format!(" dwell={dwell}us"));
    let delta = elapsed_us.map_or(String::new(), |delta| format!(" Δ={delta}us"));
    println!("telemetry:sequencer {from}->{to} drive={level} t={timestamp_us}us{dwell}{delta}");
}

#[cfg(target_os = "none")]
fn emit_ignored(state: &'static str, reason: &'static str, timestamp_us: u64) {
    defmt::debug!(
        "telemetry:sequencer ignored {} in {} t={}us",
        reason,
        state,
        timestamp_us
    );
}

#[cfg(not(target_os = "none"))]
fn emit_ignored(state: &'static str, reason: &'static str, timestamp_us: u64) {
    println!("telemetry:sequencer ignored {reason} in {state} t={timestamp_us}us");
}

const fn level_label(high: bool) -> &'static str {
    if high { "high" } else { "low" }
}

const fn reason_label(reason: IgnoreReason) -> &'static str {
    match reason {
        IgnoreReason::ForeignEdge => "foreign-edge",
        IgnoreReason::UnexpectedEdge(_) => "edge",
        IgnoreReason::StaleExpiry => "stale-expiry",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequencer_core::ports::Level;
    use sequencer_core::sequencer::TransitionCause;
    use sequencer_core::telemetry::TelemetryEventKind;

    fn micros_at(value: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_micros(value))
    }

    fn entered(from: PowerState, to: PowerState) -> Dispatch {
        Dispatch::Entered(Transition {
            from,
            to,
            cause: TransitionCause::DwellExpired,
            drive: to.drive_level(),
            dwell: Some(Duration::from_micros(972)),
        })
    }

    #[test]
    fn records_elapsed_between_transitions() {
        let mut recorder = TelemetryRecorder::new();

        let first =
            recorder.record_dispatch(&entered(PowerState::Idle, PowerState::Down1), micros_at(100));
        assert_eq!(first, 0);

        let second = recorder
            .record_dispatch(&entered(PowerState::Down1, PowerState::Up1), micros_at(1_072));
        assert_eq!(second, 1);

        let latest = recorder.recorder().latest().copied().expect("record stored");
        assert_eq!(latest.event, TelemetryEventKind::StateEntered(PowerState::Up1));
        match latest.details {
            TelemetryPayload::Transition(details) => {
                assert_eq!(details.drive, Level::High);
                assert_eq!(
                    details.elapsed_since_previous,
                    Some(Duration::from_micros(972))
                );
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn ignored_dispatches_carry_their_reason() {
        let mut recorder = TelemetryRecorder::new();
        recorder.record_dispatch(
            &Dispatch::Ignored {
                state: PowerState::Wait,
                reason: IgnoreReason::StaleExpiry,
            },
            micros_at(5),
        );

        let latest = recorder.recorder().latest().copied().expect("record stored");
        assert_eq!(latest.event, TelemetryEventKind::ExpiryIgnored(PowerState::Wait));
        assert_eq!(
            latest.details,
            TelemetryPayload::Ignored(IgnoreReason::StaleExpiry)
        );
    }
}
