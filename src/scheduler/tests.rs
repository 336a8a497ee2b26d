//! Unit tests for the frame scheduler
//!
//! Covers backpressure, inhibition, timing anomalies and reset behaviour.

use super::*;
use crate::vsync::VsyncKind;

const FRAME: Duration = Duration::from_nanos(16_666_666);

fn setup(kind: VsyncKind) -> (FrameScheduler, VsyncSource, FrameReceiver) {
    let (tx, rx) = frame_channel();
    let scheduler =
        FrameScheduler::new(OutputId::new(0), 60_000, &SchedulerConfig::default(), tx).unwrap();
    let source = VsyncSource::new(kind, 60_000).unwrap();
    (scheduler, source, rx)
}

fn drain(rx: &mut FrameReceiver) -> Vec<FrameEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn paints(events: &[FrameEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, FrameEvent::ReadyToPaint { .. }))
        .count()
}

/// Delivers a hardware vblank and feeds it to the scheduler like an output does
fn vblank(
    scheduler: &mut FrameScheduler,
    source: &mut VsyncSource,
    timestamp: Duration,
) -> Option<Result<()>> {
    let event = source.deliver(timestamp)?;
    Some(scheduler.on_frame_completed(source, event.timestamp, timestamp))
}

#[test]
fn test_first_request_schedules_one_refresh_ahead() {
    let (mut scheduler, mut source, mut rx) = setup(VsyncKind::Software);

    scheduler.request_repaint(&mut source, Duration::ZERO);

    assert!(scheduler.is_in_flight());
    assert!(!scheduler.has_pending_repaint());
    assert_eq!(source.deadline(), Some(FRAME));
    assert_eq!(
        drain(&mut rx),
        vec![FrameEvent::ReadyToPaint {
            output: OutputId::new(0),
            deadline: FRAME
        }]
    );
}

#[test]
fn test_rapid_requests_coalesce_into_one_frame() {
    let (mut scheduler, mut source, mut rx) = setup(VsyncKind::Hardware);

    scheduler.request_repaint(&mut source, Duration::ZERO);
    for _ in 0..10 {
        scheduler.request_repaint(&mut source, Duration::from_millis(1));
    }
    assert_eq!(paints(&drain(&mut rx)), 1);
    assert!(scheduler.has_pending_repaint());

    vblank(&mut scheduler, &mut source, FRAME).unwrap().unwrap();
    let events = drain(&mut rx);
    assert_eq!(
        events[0],
        FrameEvent::FrameCompleted {
            output: OutputId::new(0),
            timestamp: FRAME
        }
    );
    assert_eq!(paints(&events), 1);
    assert!(scheduler.is_in_flight());
    assert!(!scheduler.has_pending_repaint());

    // Nothing else was asked for, so the scheduler goes idle after this one
    vblank(&mut scheduler, &mut source, FRAME * 2).unwrap().unwrap();
    assert_eq!(paints(&drain(&mut rx)), 0);
    assert!(!scheduler.is_in_flight());
    assert!(!source.is_armed());
}

#[test]
fn test_one_request_yields_one_paint_per_tick_at_60hz() {
    let (mut scheduler, mut source, mut rx) = setup(VsyncKind::Hardware);

    for i in 0..5u32 {
        scheduler.request_repaint(&mut source, FRAME * i);
        assert_eq!(paints(&drain(&mut rx)), 1, "frame {}", i);

        vblank(&mut scheduler, &mut source, FRAME * (i + 1))
            .unwrap()
            .unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(paints(&events), 0);
    }

    assert_eq!(scheduler.stats().total_frames, 5);
    assert_eq!(scheduler.stats().missed_frames, 0);
}

#[test]
fn test_non_monotonic_timestamp_is_ignored() {
    let (mut scheduler, mut source, mut rx) = setup(VsyncKind::Hardware);

    scheduler.request_repaint(&mut source, Duration::ZERO);
    vblank(&mut scheduler, &mut source, Duration::from_millis(16))
        .unwrap()
        .unwrap();
    scheduler.request_repaint(&mut source, Duration::from_millis(17));
    drain(&mut rx);

    let result = vblank(&mut scheduler, &mut source, Duration::from_millis(10)).unwrap();
    assert!(matches!(result, Err(PacingError::TimingAnomaly { .. })));

    // State untouched, still waiting for a valid tick
    assert!(scheduler.is_in_flight());
    assert!(source.is_armed());
    assert_eq!(
        scheduler.last_presentation_timestamp(),
        Some(Duration::from_millis(16))
    );
    assert!(drain(&mut rx).is_empty());

    vblank(&mut scheduler, &mut source, Duration::from_millis(33))
        .unwrap()
        .unwrap();
    assert!(!scheduler.is_in_flight());
    assert_eq!(
        scheduler.last_presentation_timestamp(),
        Some(Duration::from_millis(33))
    );
}

#[test]
fn test_equal_timestamp_is_an_anomaly() {
    let (mut scheduler, mut source, _rx) = setup(VsyncKind::Hardware);

    scheduler.request_repaint(&mut source, Duration::ZERO);
    vblank(&mut scheduler, &mut source, FRAME).unwrap().unwrap();
    scheduler.request_repaint(&mut source, FRAME);

    assert!(vblank(&mut scheduler, &mut source, FRAME).unwrap().is_err());
    assert!(scheduler.is_in_flight());
}

#[test]
fn test_completion_without_frame_in_flight_is_ignored() {
    let (mut scheduler, mut source, mut rx) = setup(VsyncKind::Hardware);

    scheduler
        .on_frame_completed(&mut source, FRAME, FRAME)
        .unwrap();

    assert!(drain(&mut rx).is_empty());
    assert_eq!(scheduler.last_presentation_timestamp(), None);
    assert_eq!(scheduler.stats().total_frames, 0);
}

#[test]
fn test_inhibit_defers_and_uninhibit_resumes() {
    let (mut scheduler, mut source, mut rx) = setup(VsyncKind::Software);

    scheduler.inhibit();
    scheduler.inhibit();
    scheduler.request_repaint(&mut source, Duration::ZERO);

    assert!(scheduler.has_pending_repaint());
    assert!(!scheduler.is_in_flight());
    assert!(!source.is_armed());

    scheduler.uninhibit(&mut source, Duration::ZERO).unwrap();
    assert!(!source.is_armed());
    assert!(drain(&mut rx).is_empty());

    scheduler.uninhibit(&mut source, Duration::from_millis(2)).unwrap();
    assert!(source.is_armed());
    assert!(scheduler.is_in_flight());
    assert_eq!(paints(&drain(&mut rx)), 1);
}

#[test]
fn test_uninhibit_without_inhibit_is_an_imbalance() {
    let (mut scheduler, mut source, _rx) = setup(VsyncKind::Software);

    let result = scheduler.uninhibit(&mut source, Duration::ZERO);
    assert!(matches!(
        result,
        Err(PacingError::ResourceImbalance {
            what: Imbalance::Inhibition { .. }
        })
    ));
    assert_eq!(scheduler.inhibit_count(), 0);
}

#[test]
fn test_inhibit_while_in_flight_holds_follow_up_frame() {
    let (mut scheduler, mut source, mut rx) = setup(VsyncKind::Hardware);

    scheduler.request_repaint(&mut source, Duration::ZERO);
    scheduler.inhibit();
    scheduler.request_repaint(&mut source, Duration::ZERO);
    drain(&mut rx);

    vblank(&mut scheduler, &mut source, FRAME).unwrap().unwrap();
    assert_eq!(paints(&drain(&mut rx)), 0);
    assert!(scheduler.has_pending_repaint());
    assert!(!source.is_armed());

    scheduler.uninhibit(&mut source, FRAME).unwrap();
    assert_eq!(paints(&drain(&mut rx)), 1);
}

#[test]
fn test_reset_cancels_armed_source() {
    let (mut scheduler, mut source, mut rx) = setup(VsyncKind::Hardware);

    scheduler.request_repaint(&mut source, Duration::ZERO);
    scheduler.request_repaint(&mut source, Duration::ZERO);
    scheduler.reset(&mut source);

    assert!(!scheduler.is_in_flight());
    assert!(!scheduler.has_pending_repaint());
    assert_eq!(scheduler.next_presentation_timestamp(), None);
    assert!(vblank(&mut scheduler, &mut source, FRAME).is_none());

    drain(&mut rx);
    scheduler.request_repaint(&mut source, FRAME);
    assert_eq!(paints(&drain(&mut rx)), 1);
}

#[test]
fn test_prediction_follows_last_presentation() {
    let (mut scheduler, mut source, mut rx) = setup(VsyncKind::Hardware);

    scheduler.request_repaint(&mut source, Duration::ZERO);
    vblank(&mut scheduler, &mut source, FRAME).unwrap().unwrap();
    drain(&mut rx);

    scheduler.request_repaint(&mut source, FRAME + Duration::from_millis(2));
    assert_eq!(scheduler.next_presentation_timestamp(), Some(FRAME * 2));
}

#[test]
fn test_past_due_request_is_immediate() {
    let (mut scheduler, mut source, mut rx) = setup(VsyncKind::Software);

    scheduler.request_repaint(&mut source, Duration::ZERO);
    let tick = source.poll(FRAME).unwrap();
    scheduler
        .on_frame_completed(&mut source, tick.timestamp, FRAME)
        .unwrap();
    drain(&mut rx);

    let now = Duration::from_millis(100);
    scheduler.request_repaint(&mut source, now);
    assert_eq!(source.deadline(), Some(now));
    assert_eq!(
        drain(&mut rx),
        vec![FrameEvent::ReadyToPaint {
            output: OutputId::new(0),
            deadline: now
        }]
    );
    assert!(source.poll(now).is_some());
}

#[test]
fn test_refresh_rate_change_applies_to_next_prediction() {
    let (mut scheduler, mut source, _rx) = setup(VsyncKind::Hardware);

    scheduler.request_repaint(&mut source, Duration::ZERO);
    vblank(&mut scheduler, &mut source, FRAME).unwrap().unwrap();

    scheduler.set_refresh_rate(120_000).unwrap();
    assert_eq!(scheduler.refresh_interval(), Duration::from_nanos(8_333_333));

    scheduler.request_repaint(&mut source, FRAME);
    assert_eq!(
        scheduler.next_presentation_timestamp(),
        Some(FRAME + Duration::from_nanos(8_333_333))
    );

    assert!(scheduler.set_refresh_rate(0).is_err());
    assert_eq!(scheduler.refresh_rate(), 120_000);
}

#[test]
fn test_events_without_listener_do_not_panic() {
    let (mut scheduler, mut source, rx) = setup(VsyncKind::Hardware);
    drop(rx);

    scheduler.request_repaint(&mut source, Duration::ZERO);
    vblank(&mut scheduler, &mut source, FRAME).unwrap().unwrap();
    assert_eq!(scheduler.stats().total_frames, 1);
}
