//! Telemetry event catalog and ring buffer shared by firmware and host targets.
//!
//! The sequencer itself never logs; hosts feed every [`Dispatch`] into a
//! [`TelemetryRecorder`] which keeps the most recent records with timestamps
//! and the elapsed time between transitions. Event kinds serialise to compact
//! numeric codes for transport over diagnostics channels.

use core::{fmt, time::Duration};

use heapless::HistoryBuf;

use crate::ports::Level;
use crate::sequencer::{Dispatch, IgnoreReason, POWER_STATE_COUNT, PowerState, TransitionCause};

/// Identifier assigned to each telemetry record.
pub type EventId = u32;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    StateEntered(PowerState),
    EdgeIgnored(PowerState),
    ExpiryIgnored(PowerState),
    ForeignEdge,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::StateEntered(state) => write!(f, "state-entered {state}"),
            TelemetryEventKind::EdgeIgnored(state) => write!(f, "edge-ignored {state}"),
            TelemetryEventKind::ExpiryIgnored(state) => write!(f, "expiry-ignored {state}"),
            TelemetryEventKind::ForeignEdge => f.write_str("foreign-edge"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn state_code(state: PowerState) -> u16 {
    state.as_index() as u16
}

impl TelemetryEventKind {
    const STATE_ENTERED_BASE: u16 = 0x0000;
    const EDGE_IGNORED_BASE: u16 = 0x0008;
    const EXPIRY_IGNORED_BASE: u16 = 0x0010;
    const FOREIGN_EDGE_CODE: u16 = 0x0018;
    #[allow(clippy::cast_possible_truncation)]
    const STATE_SPAN: u16 = POWER_STATE_COUNT as u16;

    /// Classifies a dispatch.
    #[must_use]
    pub const fn from_dispatch(dispatch: &Dispatch) -> Self {
        match dispatch {
            Dispatch::Entered(transition) => TelemetryEventKind::StateEntered(transition.to),
            Dispatch::Ignored {
                reason: IgnoreReason::ForeignEdge,
                ..
            } => TelemetryEventKind::ForeignEdge,
            Dispatch::Ignored {
                state,
                reason: IgnoreReason::UnexpectedEdge(_),
            } => TelemetryEventKind::EdgeIgnored(*state),
            Dispatch::Ignored {
                state,
                reason: IgnoreReason::StaleExpiry,
            } => TelemetryEventKind::ExpiryIgnored(*state),
        }
    }

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::StateEntered(state) => Self::STATE_ENTERED_BASE + state_code(state),
            TelemetryEventKind::EdgeIgnored(state) => Self::EDGE_IGNORED_BASE + state_code(state),
            TelemetryEventKind::ExpiryIgnored(state) => {
                Self::EXPIRY_IGNORED_BASE + state_code(state)
            }
            TelemetryEventKind::ForeignEdge => Self::FOREIGN_EDGE_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        let span = Self::STATE_SPAN;
        let state_at = |base: u16| PowerState::from_index(usize::from(code - base));

        match code {
            Self::FOREIGN_EDGE_CODE => TelemetryEventKind::ForeignEdge,
            value if value < Self::STATE_ENTERED_BASE + span => state_at(Self::STATE_ENTERED_BASE)
                .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::StateEntered),
            value if (Self::EDGE_IGNORED_BASE..Self::EDGE_IGNORED_BASE + span).contains(&value) => {
                state_at(Self::EDGE_IGNORED_BASE)
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::EdgeIgnored)
            }
            value
                if (Self::EXPIRY_IGNORED_BASE..Self::EXPIRY_IGNORED_BASE + span)
                    .contains(&value) =>
            {
                state_at(Self::EXPIRY_IGNORED_BASE)
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::ExpiryIgnored)
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Details describing a state change.
    Transition(TransitionTelemetry),
    /// Why an interrupt was discarded.
    Ignored(IgnoreReason),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// State change payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransitionTelemetry {
    pub from: PowerState,
    pub cause: TransitionCause,
    pub drive: Level,
    pub dwell: Option<Duration>,
    /// Time spent in `from`, when a previous transition was recorded.
    pub elapsed_since_previous: Option<Duration>,
}

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_transition_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord<TInstant>> + '_ {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a dispatch, capturing elapsed time since the previous transition.
    pub fn record_dispatch(&mut self, dispatch: &Dispatch, timestamp: TInstant) -> EventId {
        let event = TelemetryEventKind::from_dispatch(dispatch);
        let payload = match dispatch {
            Dispatch::Entered(transition) => {
                let elapsed = self
                    .last_transition_at
                    .map(|previous| timestamp.saturating_duration_since(previous));
                self.last_transition_at = Some(timestamp);

                TelemetryPayload::Transition(TransitionTelemetry {
                    from: transition.from,
                    cause: transition.cause,
                    drive: transition.drive,
                    dwell: transition.dwell,
                    elapsed_since_previous: elapsed,
                })
            }
            Dispatch::Ignored { reason, .. } => TelemetryPayload::Ignored(*reason),
        };

        self.record(event, payload, timestamp)
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        details: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details,
        });
        id
    }

    /// Forgets every record and the transition reference point.
    pub fn clear(&mut self) {
        self.ring.clear();
        self.last_transition_at = None;
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::Transition;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    struct MockInstant(u64);

    impl TelemetryInstant for MockInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    fn entered(from: PowerState, to: PowerState, cause: TransitionCause) -> Dispatch {
        Dispatch::Entered(Transition {
            from,
            to,
            cause,
            drive: to.drive_level(),
            dwell: None,
        })
    }

    #[test]
    fn raw_codes_decode_to_the_same_event() {
        let events = [
            TelemetryEventKind::StateEntered(PowerState::Down15),
            TelemetryEventKind::EdgeIgnored(PowerState::Up1),
            TelemetryEventKind::ExpiryIgnored(PowerState::Wait),
            TelemetryEventKind::ForeignEdge,
        ];
        for event in events {
            assert_eq!(TelemetryEventKind::from_raw(event.to_raw()), event);
        }
        assert_eq!(
            TelemetryEventKind::from_raw(0x0042),
            TelemetryEventKind::Custom(0x0042)
        );
    }

    #[test]
    fn recorder_tracks_time_between_transitions() {
        let mut recorder: TelemetryRecorder<MockInstant, 4> = TelemetryRecorder::new();

        recorder.record_dispatch(
            &entered(PowerState::Idle, PowerState::Down1, TransitionCause::Press),
            MockInstant(100),
        );
        recorder.record_dispatch(
            &Dispatch::Ignored {
                state: PowerState::Down1,
                reason: IgnoreReason::UnexpectedEdge(Level::High),
            },
            MockInstant(400),
        );
        let id = recorder.record_dispatch(
            &entered(PowerState::Down1, PowerState::Up1, TransitionCause::DwellExpired),
            MockInstant(1_072),
        );

        assert_eq!(id, 2);
        let latest = recorder.latest().expect("record stored");
        assert_eq!(latest.event, TelemetryEventKind::StateEntered(PowerState::Up1));
        match latest.details {
            TelemetryPayload::Transition(details) => {
                assert_eq!(details.from, PowerState::Down1);
                assert_eq!(
                    details.elapsed_since_previous,
                    Some(Duration::from_micros(972))
                );
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn ring_keeps_only_recent_records() {
        let mut recorder: TelemetryRecorder<MockInstant, 2> = TelemetryRecorder::new();
        for tick in 0..3 {
            recorder.record(
                TelemetryEventKind::Custom(tick),
                TelemetryPayload::none(),
                MockInstant(u64::from(tick)),
            );
        }

        let ids: heapless::Vec<EventId, 2> =
            recorder.oldest_first().map(|record| record.id).collect();
        assert_eq!(ids.as_slice(), &[1, 2]);
        assert_eq!(recorder.len(), 2);
    }
}
