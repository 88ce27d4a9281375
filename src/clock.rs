//! Pause/resume-correct elapsed-time state machine.
//!
//! The clock never ticks. Elapsed time is always recomputed from two stored
//! values, `accumulated_elapsed` and the `start_timestamp` of the current
//! running stretch, plus a wall-clock read. That is what keeps it correct
//! across arbitrary process suspension: resuming from background recomputes
//! the same formula with no drift and no missed ticks.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Run state of the session clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
}

/// The mutable state of one tracked session.
///
/// Owned exclusively by [`SessionClock`] and mutated only through its
/// transition operations. Serializable so the draft store can persist a
/// snapshot and a relaunch can restore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub activity_type: String,
    pub label: String,
    pub gps_allowed: bool,
    /// Start of the current running stretch, epoch ms. None while paused
    /// or completed.
    pub start_timestamp: Option<i64>,
    /// Elapsed milliseconds accumulated over previous running stretches.
    pub accumulated_elapsed: i64,
    pub state: RunState,
    /// Countdown target in ms; 0 means stopwatch mode.
    pub total_duration: i64,
    /// Whether the countdown alarm has already fired for this session.
    pub alarm_fired: bool,
}

/// Pause/resume-correct session clock.
///
/// `Idle -> Running <-> Paused -> Completed`, with an edge-triggered alarm
/// when `total_duration > 0`. Requires no synchronization: every read is a
/// pure function of the stored snapshots and a wall-clock read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionClock {
    session: Option<ActiveSession>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Current run state. Idle when no session exists.
    pub fn state(&self) -> RunState {
        self.session.as_ref().map(|s| s.state).unwrap_or(RunState::Idle)
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    /// Restore a previously persisted session snapshot, replacing whatever
    /// the clock currently holds.
    pub fn restore(&mut self, session: Option<ActiveSession>) {
        self.session = session;
    }

    /// Start a new session. Allowed from Idle or Completed.
    ///
    /// `total_duration` of 0 selects stopwatch mode; a positive value arms
    /// the countdown alarm.
    pub fn start(
        &mut self,
        activity_type: String,
        label: String,
        gps_allowed: bool,
        total_duration: i64,
    ) -> Result<()> {
        self.start_at(activity_type, label, gps_allowed, total_duration, now_ms())
    }

    pub fn start_at(
        &mut self,
        activity_type: String,
        label: String,
        gps_allowed: bool,
        total_duration: i64,
        now: i64,
    ) -> Result<()> {
        match self.state() {
            RunState::Idle | RunState::Completed => {
                self.session = Some(ActiveSession {
                    activity_type,
                    label,
                    gps_allowed,
                    start_timestamp: Some(now),
                    accumulated_elapsed: 0,
                    state: RunState::Running,
                    total_duration: total_duration.max(0),
                    alarm_fired: false,
                });
                Ok(())
            }
            state => Err(TrackerError::ClockTransition {
                action: "start",
                state,
            }),
        }
    }

    /// Pause a running session, banking the elapsed time of the current
    /// running stretch.
    pub fn pause(&mut self) -> Result<()> {
        self.pause_at(now_ms())
    }

    pub fn pause_at(&mut self, now: i64) -> Result<()> {
        let state = self.state();
        match self.session.as_mut() {
            Some(s) if s.state == RunState::Running => {
                if let Some(started) = s.start_timestamp {
                    s.accumulated_elapsed += now - started;
                }
                s.start_timestamp = None;
                s.state = RunState::Paused;
                Ok(())
            }
            _ => Err(TrackerError::ClockTransition {
                action: "pause",
                state,
            }),
        }
    }

    /// Resume a paused session. The banked elapsed time is unchanged; a new
    /// running stretch begins now.
    pub fn resume(&mut self) -> Result<()> {
        self.resume_at(now_ms())
    }

    pub fn resume_at(&mut self, now: i64) -> Result<()> {
        let state = self.state();
        match self.session.as_mut() {
            Some(s) if s.state == RunState::Paused => {
                s.start_timestamp = Some(now);
                s.state = RunState::Running;
                Ok(())
            }
            _ => Err(TrackerError::ClockTransition {
                action: "resume",
                state,
            }),
        }
    }

    /// Complete a running or paused session, freezing its elapsed time.
    pub fn stop(&mut self) -> Result<()> {
        self.stop_at(now_ms())
    }

    pub fn stop_at(&mut self, now: i64) -> Result<()> {
        let state = self.state();
        match self.session.as_mut() {
            Some(s) if s.state == RunState::Running || s.state == RunState::Paused => {
                if s.state == RunState::Running {
                    if let Some(started) = s.start_timestamp {
                        s.accumulated_elapsed += now - started;
                    }
                }
                s.start_timestamp = None;
                s.state = RunState::Completed;
                Ok(())
            }
            _ => Err(TrackerError::ClockTransition {
                action: "stop",
                state,
            }),
        }
    }

    /// Unconditional reset to Idle, discarding the session. Last writer
    /// wins; this is invoked from a single user-driven call site.
    pub fn cancel(&mut self) {
        self.session = None;
    }

    /// Elapsed milliseconds. Pure read, no mutation.
    pub fn elapsed(&self) -> i64 {
        self.elapsed_at(now_ms())
    }

    pub fn elapsed_at(&self, now: i64) -> i64 {
        match self.session.as_ref() {
            Some(s) if s.state == RunState::Running => {
                s.accumulated_elapsed + s.start_timestamp.map(|t| now - t).unwrap_or(0)
            }
            Some(s) => s.accumulated_elapsed,
            None => 0,
        }
    }

    /// Edge-triggered countdown alarm check.
    ///
    /// Returns true exactly once per session, when the clock is Running
    /// with a countdown target and elapsed time has reached it. Cleared
    /// only by `cancel` or a fresh `start`.
    pub fn poll_alarm(&mut self) -> bool {
        self.poll_alarm_at(now_ms())
    }

    pub fn poll_alarm_at(&mut self, now: i64) -> bool {
        let elapsed = self.elapsed_at(now);
        match self.session.as_mut() {
            Some(s)
                if s.state == RunState::Running
                    && s.total_duration > 0
                    && !s.alarm_fired
                    && elapsed >= s.total_duration =>
            {
                s.alarm_fired = true;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(total_duration: i64) -> SessionClock {
        let mut clock = SessionClock::new();
        clock
            .start_at("Run".into(), "Morning run".into(), true, total_duration, 0)
            .unwrap();
        clock
    }

    #[test]
    fn test_elapsed_while_running() {
        let clock = started(0);
        assert_eq!(clock.elapsed_at(0), 0);
        assert_eq!(clock.elapsed_at(5_000), 5_000);
        assert_eq!(clock.elapsed_at(60_000), 60_000);
    }

    #[test]
    fn test_pause_banks_elapsed_and_resume_continues() {
        let mut clock = started(0);

        // Pause at 37 s, resume 600 s later (simulating backgrounding).
        clock.pause_at(37_000).unwrap();
        assert_eq!(clock.elapsed_at(37_000), 37_000);
        assert_eq!(clock.elapsed_at(400_000), 37_000);

        clock.resume_at(637_000).unwrap();
        assert_eq!(clock.elapsed_at(637_000), 37_000);
        assert_eq!(clock.elapsed_at(647_000), 47_000);
    }

    #[test]
    fn test_elapsed_monotone_while_running() {
        let clock = started(0);
        let mut last = 0;
        for now in [0, 1, 500, 10_000, 10_001, 99_999] {
            let e = clock.elapsed_at(now);
            assert!(e >= last);
            last = e;
        }
    }

    #[test]
    fn test_stop_freezes_elapsed() {
        let mut clock = started(0);
        clock.stop_at(12_500).unwrap();
        assert_eq!(clock.state(), RunState::Completed);
        assert_eq!(clock.elapsed_at(999_999), 12_500);
    }

    #[test]
    fn test_stop_from_paused_keeps_banked_time() {
        let mut clock = started(0);
        clock.pause_at(8_000).unwrap();
        clock.stop_at(20_000).unwrap();
        assert_eq!(clock.elapsed_at(30_000), 8_000);
    }

    #[test]
    fn test_alarm_fires_exactly_once() {
        let mut clock = started(10_000);
        assert!(!clock.poll_alarm_at(9_999));
        assert!(clock.poll_alarm_at(10_000));
        // Repeated polls past the target must not re-fire.
        assert!(!clock.poll_alarm_at(10_001));
        assert!(!clock.poll_alarm_at(60_000));
    }

    #[test]
    fn test_alarm_cleared_by_fresh_start() {
        let mut clock = started(10_000);
        assert!(clock.poll_alarm_at(10_000));
        clock.stop_at(11_000).unwrap();
        clock
            .start_at("Run".into(), "Again".into(), true, 10_000, 100_000)
            .unwrap();
        assert!(clock.poll_alarm_at(110_000));
    }

    #[test]
    fn test_stopwatch_mode_never_alarms() {
        let mut clock = started(0);
        assert!(!clock.poll_alarm_at(i64::MAX));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut clock = SessionClock::new();
        assert!(clock.pause_at(0).is_err());
        assert!(clock.resume_at(0).is_err());
        assert!(clock.stop_at(0).is_err());

        clock.start_at("Run".into(), "".into(), true, 0, 0).unwrap();
        assert!(clock.resume_at(1).is_err());
        assert!(clock.start_at("Run".into(), "".into(), true, 0, 1).is_err());
    }

    #[test]
    fn test_cancel_resets_to_idle() {
        let mut clock = started(0);
        clock.cancel();
        assert_eq!(clock.state(), RunState::Idle);
        assert_eq!(clock.elapsed_at(50_000), 0);
        // A fresh start is allowed again.
        assert!(clock.start_at("Ride".into(), "".into(), false, 0, 0).is_ok());
    }

    #[test]
    fn test_snapshot_roundtrip_restores_elapsed() {
        let mut clock = started(0);
        clock.pause_at(42_000).unwrap();

        let snapshot = clock.session().cloned();
        let mut restored = SessionClock::new();
        restored.restore(snapshot);

        assert_eq!(restored.state(), RunState::Paused);
        assert_eq!(restored.elapsed_at(900_000), 42_000);
    }
}
