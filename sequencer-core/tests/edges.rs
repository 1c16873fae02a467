use core::time::Duration;

use sequencer_core::ports::{EdgeFlags, Level};
use sequencer_core::sequencer::{Dispatch, IgnoreReason, PowerState, SequencerConfig};
use sequencer_core::sim::{SimBoard, SimInstant};

const SETTLE_LIMIT: Duration = Duration::from_millis(100);

/// Drive level and timer always agree with the state.
fn assert_consistent(board: &SimBoard) {
    let state = board.state();
    assert_eq!(board.drive_level(), state.drive_level(), "drive in {state}");
    assert_eq!(
        board.deadline().is_some(),
        !state.awaits_edge(),
        "timer in {state}"
    );
    assert_eq!(board.sequencer().drive_level(), board.drive_level());
}

#[test]
fn edges_during_the_train_are_ignored() {
    let mut board = SimBoard::powered(SequencerConfig::default());
    board.press();
    board.advance(Duration::from_micros(1_500));
    assert_eq!(board.state(), PowerState::Up1);
    let deadline = board.deadline();

    assert_eq!(
        board.release(),
        Some(Dispatch::Ignored {
            state: PowerState::Up1,
            reason: IgnoreReason::UnexpectedEdge(Level::High),
        })
    );
    assert_eq!(
        board.press(),
        Some(Dispatch::Ignored {
            state: PowerState::Up1,
            reason: IgnoreReason::UnexpectedEdge(Level::Low),
        })
    );
    assert_eq!(board.deadline(), deadline);
    assert_consistent(&board);
}

#[test]
fn release_before_down15_expires_never_waits() {
    let mut board = SimBoard::powered(SequencerConfig::default());
    board.press();
    board.advance(Duration::from_millis(17));
    board.release();

    board.advance(Duration::from_millis(20));

    assert_eq!(board.state(), PowerState::Idle);
    assert!(board.waveform().all(|edge| edge.state != PowerState::Wait));
    assert_consistent(&board);
}

#[test]
fn release_on_the_last_tick_of_down15_returns_to_idle() {
    let mut board = SimBoard::powered(SequencerConfig::default());
    board.press();
    board.advance(Duration::from_micros(31_259));
    assert_eq!(board.state(), PowerState::Down15);

    board.release();
    board.advance(Duration::from_micros(1));

    assert_eq!(board.state(), PowerState::Idle);
    assert_eq!(board.now(), SimInstant::from_micros(31_260));
    assert_consistent(&board);
}

#[test]
fn release_pending_with_down15_expiry_serviced_expiry_first() {
    let mut board = SimBoard::powered(SequencerConfig::default());
    board.press();
    board.advance(Duration::from_micros(31_259));
    board.latch_button(Level::High);
    assert!(board.latch_expiry());
    assert_eq!(board.now(), SimInstant::from_micros(31_260));

    let expiry = board.service_expiry().expect("expiry latched");
    assert_eq!(expiry.state_after(), PowerState::Idle);
    assert_eq!(
        board.service_pending_edge(),
        Some(Dispatch::Ignored {
            state: PowerState::Idle,
            reason: IgnoreReason::UnexpectedEdge(Level::High),
        })
    );

    assert_eq!(board.state(), PowerState::Idle);
    assert!(board.waveform().all(|edge| edge.state != PowerState::Wait));
    assert_consistent(&board);
}

#[test]
fn release_pending_with_down15_expiry_serviced_edge_first() {
    let mut board = SimBoard::powered(SequencerConfig::default());
    board.press();
    board.advance(Duration::from_micros(31_259));
    assert!(board.latch_expiry());
    board.latch_button(Level::High);

    assert_eq!(
        board.service_pending_edge(),
        Some(Dispatch::Ignored {
            state: PowerState::Down15,
            reason: IgnoreReason::UnexpectedEdge(Level::High),
        })
    );
    let expiry = board.service_expiry().expect("expiry latched");
    assert_eq!(expiry.state_after(), PowerState::Idle);

    assert_eq!(board.state(), PowerState::Idle);
    assert!(board.waveform().all(|edge| edge.state != PowerState::Wait));
    assert_consistent(&board);
}

#[test]
fn release_right_after_down15_expires_emits_release_pulse() {
    let mut board = SimBoard::powered(SequencerConfig::default());
    board.press();
    board.advance(Duration::from_micros(31_260));
    assert_eq!(board.state(), PowerState::Wait);

    let dispatch = board.release().expect("edge latched");
    assert_eq!(dispatch.state_after(), PowerState::Down2);
    assert_consistent(&board);
}

#[test]
fn foreign_port_flags_are_cleared_without_effect() {
    let mut board = SimBoard::powered(SequencerConfig::default());

    assert_eq!(
        board.raise_foreign_edge(EdgeFlags::from_bits(0b1000)),
        Some(Dispatch::Ignored {
            state: PowerState::Idle,
            reason: IgnoreReason::ForeignEdge,
        })
    );
    assert!(!board.sequencer().button().has_pending());
    assert_eq!(board.state(), PowerState::Idle);
    assert_consistent(&board);
}

#[test]
fn foreign_edge_does_not_mask_a_following_press() {
    let mut board = SimBoard::powered(SequencerConfig::default());
    board.advance(Duration::from_micros(10));

    board.raise_foreign_edge(EdgeFlags::from_bits(0b0010));
    let dispatch = board.press().expect("edge latched");

    assert_eq!(dispatch.state_after(), PowerState::Down1);
    assert_eq!(board.deadline(), Some(SimInstant::from_micros(982)));
    assert_consistent(&board);
}

#[test]
fn bounce_from_idle_starts_exactly_one_train() {
    let mut board = SimBoard::powered(SequencerConfig::default());
    board.bounce(5, Duration::from_micros(50));

    assert_eq!(board.state(), PowerState::Down1);
    assert_eq!(board.button_level(), Level::Low);
    assert_eq!(board.sequencer().timer().starts(), 1);
    assert_consistent(&board);

    let mut ignored = 0;
    while let Some(timed) = board.pop_dispatch() {
        if let Dispatch::Ignored { reason, .. } = timed.dispatch {
            assert!(matches!(reason, IgnoreReason::UnexpectedEdge(_)));
            ignored += 1;
        }
    }
    assert_eq!(ignored, 4);
}

#[test]
fn state_pin_and_timer_stay_consistent_under_chatter() {
    let mut board = SimBoard::powered(SequencerConfig::default());
    board.press();
    for _ in 0..40 {
        board.bounce(3, Duration::from_micros(130));
        board.advance(Duration::from_micros(577));
        assert_consistent(&board);
    }

    board.release();
    assert!(board.run_until_quiet(SETTLE_LIMIT));
    assert_eq!(board.state(), PowerState::Idle);
    assert_consistent(&board);
}
