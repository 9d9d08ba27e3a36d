//! Inactivity counting and display power transitions.

use tracing::{debug, error, info, warn};

use crate::animator::Animator;
use crate::platform::display_power::DisplayPower;

/// When the wake animation plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum WakeAnimation {
    /// Only on the asleep → awake transition.
    OnWake,
    /// On every activity event, pulsing the strip while the display is already on.
    #[default]
    EveryActivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleState {
    pub missed_checks: u32,
    pub display_on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Woke,
    Slept,
}

/// Owns the [`IdleState`] and drives the display (and optional animator) from
/// activity and tick signals.
pub struct IdleMachine<D> {
    state: IdleState,
    max_attempts: u32,
    display: D,
    animator: Option<Box<dyn Animator>>,
    wake_animation: WakeAnimation,
}

impl<D: DisplayPower> IdleMachine<D> {
    /// Seeds the machine from the display's real power state.
    ///
    /// A failed query starts the machine asleep so the first activity powers the display on.
    pub fn start(mut display: D, max_attempts: u32) -> Self {
        let display_on = match display.query_power() {
            Ok(on) => on,
            Err(err) => {
                warn!(error = %err, "could not query display power; assuming off");
                false
            }
        };
        info!(display_on, "initial display state");
        Self::with_state(display, max_attempts, display_on)
    }

    pub fn with_state(display: D, max_attempts: u32, display_on: bool) -> Self {
        Self {
            state: IdleState {
                missed_checks: 0,
                display_on,
            },
            max_attempts: max_attempts.max(1),
            display,
            animator: None,
            wake_animation: WakeAnimation::default(),
        }
    }

    pub fn with_animator(mut self, animator: Box<dyn Animator>, policy: WakeAnimation) -> Self {
        self.animator = Some(animator);
        self.wake_animation = policy;
        self
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn on_activity(&mut self) -> Option<Transition> {
        self.state.missed_checks = 0;

        if self.state.display_on {
            if self.wake_animation == WakeAnimation::EveryActivity {
                self.play_wake_sequence();
            }
            return None;
        }

        info!("activity detected, turning display on");
        self.set_power(true);
        self.play_wake_sequence();
        self.state.display_on = true;
        Some(Transition::Woke)
    }

    pub fn on_tick(&mut self) -> Option<Transition> {
        self.state.missed_checks = self.state.missed_checks.saturating_add(1);
        let (missed, max) = (self.state.missed_checks, self.max_attempts);
        if self.state.display_on {
            info!(missed, max, "no activity detected");
        } else {
            debug!(missed, max, "no activity detected; display already off");
        }

        if self.state.missed_checks < self.max_attempts || !self.state.display_on {
            return None;
        }

        info!("timeout reached, turning display off");
        self.set_power(false);
        if let Some(animator) = self.animator.as_mut() {
            if let Err(err) = animator.play_sleep_indicator() {
                warn!(error = %err, "sleep indicator failed");
            }
        }
        self.state.display_on = false;
        Some(Transition::Slept)
    }

    fn set_power(&mut self, on: bool) {
        // State follows the request even when the command fails; the next transition retries.
        if let Err(err) = self.display.set_power(on) {
            error!(error = %err, on, "display power command failed");
        }
    }

    fn play_wake_sequence(&mut self) {
        if let Some(animator) = self.animator.as_mut() {
            if let Err(err) = animator.play_wake_sequence() {
                warn!(error = %err, "wake animation failed");
            }
        }
    }
}

impl<D> std::fmt::Debug for IdleMachine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleMachine")
            .field("state", &self.state)
            .field("max_attempts", &self.max_attempts)
            .field("has_animator", &self.animator.is_some())
            .field("wake_animation", &self.wake_animation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AnimationError, DisplayControlError};
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeDisplay {
        queried: Option<bool>,
        calls: Vec<bool>,
        fail_set: bool,
    }

    impl DisplayPower for FakeDisplay {
        fn query_power(&mut self) -> Result<bool, DisplayControlError> {
            self.queried.ok_or_else(|| DisplayControlError::Spawn {
                command: "vcgencmd display_power".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })
        }

        fn set_power(&mut self, on: bool) -> Result<(), DisplayControlError> {
            self.calls.push(on);
            if self.fail_set {
                return Err(DisplayControlError::Status {
                    command: "vcgencmd display_power".into(),
                    code: Some(1),
                    stderr: String::new(),
                });
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Cue {
        Wake,
        Sleep,
    }

    #[derive(Clone, Default)]
    struct RecordingAnimator {
        cues: Arc<Mutex<Vec<Cue>>>,
    }

    impl Animator for RecordingAnimator {
        fn play_wake_sequence(&mut self) -> Result<(), AnimationError> {
            self.cues.lock().unwrap().push(Cue::Wake);
            Ok(())
        }

        fn play_sleep_indicator(&mut self) -> Result<(), AnimationError> {
            self.cues.lock().unwrap().push(Cue::Sleep);
            Err(AnimationError::Show(io::Error::from(io::ErrorKind::BrokenPipe)))
        }
    }

    fn awake(max_attempts: u32) -> IdleMachine<FakeDisplay> {
        IdleMachine::with_state(FakeDisplay::default(), max_attempts, true)
    }

    #[test]
    fn starts_from_queried_power_state() {
        let on = FakeDisplay {
            queried: Some(true),
            ..FakeDisplay::default()
        };
        assert!(IdleMachine::start(on, 6).state().display_on);

        let off = FakeDisplay {
            queried: Some(false),
            ..FakeDisplay::default()
        };
        assert!(!IdleMachine::start(off, 6).state().display_on);
    }

    #[test]
    fn failed_query_starts_asleep() {
        let machine = IdleMachine::start(FakeDisplay::default(), 6);
        assert_eq!(
            machine.state(),
            IdleState {
                missed_checks: 0,
                display_on: false
            }
        );
    }

    #[test]
    fn sleeps_on_exactly_the_sixth_tick() {
        let mut machine = awake(6);
        for tick in 1..=5 {
            assert_eq!(machine.on_tick(), None, "tick {tick}");
            assert!(machine.state().display_on);
        }
        assert_eq!(machine.on_tick(), Some(Transition::Slept));
        assert!(!machine.state().display_on);
        assert_eq!(machine.display().calls, [false]);
    }

    #[test]
    fn ticks_while_asleep_do_not_repeat_power_off() {
        let mut machine = awake(2);
        for _ in 0..10 {
            machine.on_tick();
        }
        assert_eq!(machine.state().missed_checks, 10);
        assert_eq!(machine.display().calls, [false]);
    }

    #[test]
    fn activity_resets_counter_in_every_state() {
        let mut machine = awake(6);
        machine.on_tick();
        machine.on_tick();
        assert_eq!(machine.on_activity(), None);
        assert_eq!(machine.state().missed_checks, 0);

        let mut machine = IdleMachine::with_state(FakeDisplay::default(), 6, false);
        machine.on_tick();
        assert_eq!(machine.on_activity(), Some(Transition::Woke));
        assert_eq!(machine.state().missed_checks, 0);
    }

    #[test]
    fn activity_while_asleep_powers_on_once() {
        let mut machine = IdleMachine::with_state(FakeDisplay::default(), 6, false);
        assert_eq!(machine.on_activity(), Some(Transition::Woke));
        assert_eq!(machine.on_activity(), None);
        assert!(machine.state().display_on);
        assert_eq!(machine.display().calls, [true]);
    }

    #[test]
    fn activity_then_six_idle_ticks_powers_off_once() {
        let mut machine = awake(6);
        machine.on_activity();
        for _ in 0..6 {
            machine.on_tick();
        }
        assert_eq!(machine.display().calls, [false]);
    }

    #[test]
    fn counting_restarts_after_activity() {
        let mut machine = awake(3);
        machine.on_tick();
        machine.on_tick();
        machine.on_activity();
        machine.on_tick();
        machine.on_tick();
        assert!(machine.state().display_on);
        assert_eq!(machine.on_tick(), Some(Transition::Slept));
    }

    #[test]
    fn failed_power_command_still_updates_state() {
        let display = FakeDisplay {
            fail_set: true,
            ..FakeDisplay::default()
        };
        let mut machine = IdleMachine::with_state(display, 1, true);
        assert_eq!(machine.on_tick(), Some(Transition::Slept));
        assert!(!machine.state().display_on);
        assert_eq!(machine.on_activity(), Some(Transition::Woke));
        assert!(machine.state().display_on);
    }

    #[test]
    fn every_activity_policy_pulses_while_awake() {
        let animator = RecordingAnimator::default();
        let cues = animator.cues.clone();
        let mut machine = awake(1).with_animator(Box::new(animator), WakeAnimation::EveryActivity);

        machine.on_activity();
        machine.on_activity();
        machine.on_tick();
        machine.on_activity();

        assert_eq!(
            *cues.lock().unwrap(),
            [Cue::Wake, Cue::Wake, Cue::Sleep, Cue::Wake]
        );
        assert_eq!(machine.display().calls, [false, true]);
    }

    #[test]
    fn on_wake_policy_animates_transitions_only() {
        let animator = RecordingAnimator::default();
        let cues = animator.cues.clone();
        let mut machine = awake(1).with_animator(Box::new(animator), WakeAnimation::OnWake);

        machine.on_activity();
        machine.on_tick();
        machine.on_activity();
        machine.on_activity();

        assert_eq!(*cues.lock().unwrap(), [Cue::Sleep, Cue::Wake]);
    }
}
