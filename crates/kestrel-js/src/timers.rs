//! Timer APIs
//!
//! Implements setTimeout and setInterval on the bridge's virtual clock.
//! Timers never fire on their own: the clock is advanced by the host, due
//! timers are queued as bottom halves, and callbacks run from there.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

use crate::engine::{RootId, ScriptEngine, Value};
use crate::error::ScriptError;
use crate::host::Host;
use crate::value::ScriptValue;

/// Timer id as seen by script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

/// What a timer runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCallback {
    /// Source text, evaluated in the global scope
    Source(String),
    /// Rooted callable
    Function(RootId),
}

impl TimerCallback {
    /// Root to release once the timer is gone
    pub fn root(&self) -> Option<RootId> {
        match self {
            Self::Function(root) => Some(*root),
            Self::Source(_) => None,
        }
    }
}

/// Lifecycle of a pending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Created,
    Scheduled,
    /// The callback is running or has run
    Fired,
    Cancelled,
}

/// Timer entry
#[derive(Debug, Clone)]
pub struct Timer {
    pub id: TimerId,
    pub callback: TimerCallback,
    pub delay: Duration,
    pub repeat: bool,
    pub due: Duration,
    pub state: TimerState,
    /// Sitting in the bottom-half queue
    pub queued: bool,
}

impl Timer {
    fn schedule(&mut self, now: Duration) {
        self.due = now + self.delay;
        self.state = TimerState::Scheduled;
    }
}

/// Timer manager
#[derive(Debug, Default)]
pub struct TimerManager {
    timers: HashMap<TimerId, Timer>,
    next_id: u32,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, callback: TimerCallback, delay: Duration, repeat: bool, now: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let mut timer = Timer { id, callback, delay, repeat, due: now, state: TimerState::Created, queued: false };
        timer.schedule(now);
        self.timers.insert(id, timer);
        id
    }

    /// Add a timeout
    pub fn set_timeout(&mut self, callback: TimerCallback, delay: Duration, now: Duration) -> TimerId {
        self.add(callback, delay, false, now)
    }

    /// Add an interval
    pub fn set_interval(&mut self, callback: TimerCallback, delay: Duration, now: Duration) -> TimerId {
        self.add(callback, delay, true, now)
    }

    pub fn get(&self, id: TimerId) -> Option<&Timer> {
        self.timers.get(&id)
    }

    /// Cancel a timer. Unknown and finished ids are a no-op.
    ///
    /// Returns the callback when the entry was dropped right away; a timer
    /// that is queued or running is only marked and dropped by [`finish`].
    ///
    /// [`finish`]: TimerManager::finish
    pub fn clear(&mut self, id: TimerId) -> Option<TimerCallback> {
        let timer = self.timers.get_mut(&id)?;
        match timer.state {
            TimerState::Scheduled if !timer.queued => self.timers.remove(&id).map(|t| t.callback),
            TimerState::Scheduled | TimerState::Fired => {
                timer.state = TimerState::Cancelled;
                None
            }
            TimerState::Created | TimerState::Cancelled => None,
        }
    }

    /// Mark every timer due at `now` as queued. Returns them in firing order.
    pub fn collect_due(&mut self, now: Duration) -> Vec<TimerId> {
        let mut due: Vec<&mut Timer> = self
            .timers
            .values_mut()
            .filter(|t| t.state == TimerState::Scheduled && !t.queued && t.due <= now)
            .collect();
        due.sort_by_key(|t| (t.due, t.id));
        due.into_iter()
            .map(|t| {
                t.queued = true;
                t.id
            })
            .collect()
    }

    /// Take a queued timer out of the queue. `None` if it was cancelled.
    pub fn start(&mut self, id: TimerId) -> Option<TimerCallback> {
        let timer = self.timers.get_mut(&id)?;
        timer.queued = false;
        if timer.state != TimerState::Scheduled {
            return None;
        }
        timer.state = TimerState::Fired;
        Some(timer.callback.clone())
    }

    /// Settle a timer after [`start`](TimerManager::start): reschedule a live
    /// interval, otherwise drop the entry and return its callback.
    pub fn finish(&mut self, id: TimerId, now: Duration) -> Option<TimerCallback> {
        let timer = self.timers.get_mut(&id)?;
        if timer.repeat && timer.state == TimerState::Fired {
            timer.schedule(now);
            trace!("Interval {:?} rescheduled for {:?}", id, timer.due);
            return None;
        }
        self.timers.remove(&id).map(|t| t.callback)
    }

    /// Timers that will still fire
    pub fn pending(&self) -> usize {
        self.timers.values().filter(|t| matches!(t.state, TimerState::Scheduled | TimerState::Fired)).count()
    }

    /// Check if there are pending timers
    pub fn has_pending(&self) -> bool {
        self.pending() > 0
    }

    /// Get time until next timer fires
    pub fn time_until_next(&self, now: Duration) -> Option<Duration> {
        self.timers
            .values()
            .filter(|t| t.state == TimerState::Scheduled && !t.queued)
            .map(|t| t.due.saturating_sub(now))
            .min()
    }

    /// Remove every timer, returning their callbacks
    pub fn drain(&mut self) -> Vec<TimerCallback> {
        self.timers.drain().map(|(_, t)| t.callback).collect()
    }
}

fn delay_arg<E: ScriptEngine>(args: &[Value<E>]) -> Duration {
    let ms = args.get(1).map_or(0.0, ScriptValue::to_number);
    if ms.is_finite() && ms > 0.0 { Duration::from_millis(ms as u64) } else { Duration::ZERO }
}

fn callback_arg<E: ScriptEngine>(engine: &mut E, args: &[Value<E>]) -> Result<TimerCallback, ScriptError> {
    match args.first() {
        Some(f) if engine.is_callable(f) => Ok(TimerCallback::Function(engine.add_root(f.clone()))),
        Some(ScriptValue::String(source)) => Ok(TimerCallback::Source(source.clone())),
        _ => Err(ScriptError::type_error("timer callback must be a function or source text")),
    }
}

fn id_arg<E: ScriptEngine>(args: &[Value<E>]) -> Option<TimerId> {
    let n = args.first()?.to_number();
    (n.is_finite() && n >= 1.0).then(|| TimerId(n as u32))
}

fn schedule<E: ScriptEngine>(
    host: &Host<E>,
    engine: &mut E,
    args: &[Value<E>],
    repeat: bool,
) -> Result<Value<E>, ScriptError> {
    host.check_capacity()?;
    let mut delay = delay_arg::<E>(args);
    if repeat {
        delay = delay.max(Duration::from_millis(host.config.min_interval_ms));
    }
    let callback = callback_arg(engine, args)?;
    let mut bridge = host.bridge.borrow_mut();
    let now = bridge.now();
    let id = if repeat {
        bridge.timers.set_interval(callback, delay, now)
    } else {
        bridge.timers.set_timeout(callback, delay, now)
    };
    trace!("Timer {:?} scheduled, delay {:?}, repeat {}", id, delay, repeat);
    Ok(ScriptValue::from(id.0))
}

fn cancel<E: ScriptEngine>(host: &Host<E>, engine: &mut E, args: &[Value<E>]) -> Result<Value<E>, ScriptError> {
    if let Some(id) = id_arg::<E>(args) {
        let released = host.bridge.borrow_mut().timers.clear(id);
        if let Some(root) = released.as_ref().and_then(TimerCallback::root) {
            engine.remove_root(root);
        }
    }
    Ok(ScriptValue::Undefined)
}

/// Install timer APIs into global object
pub(crate) fn install_timers<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E) -> Result<(), ScriptError> {
    let global = engine.global();

    let h = host.clone();
    let f = engine.create_function("setTimeout", Rc::new(move |engine, _, args| schedule(&h, engine, args, false)))?;
    engine.set(&global, "setTimeout", ScriptValue::Object(f))?;

    let h = host.clone();
    let f = engine.create_function("setInterval", Rc::new(move |engine, _, args| schedule(&h, engine, args, true)))?;
    engine.set(&global, "setInterval", ScriptValue::Object(f))?;

    let h = host.clone();
    let f = engine.create_function("clearTimeout", Rc::new(move |engine, _, args| cancel(&h, engine, args)))?;
    engine.set(&global, "clearTimeout", ScriptValue::Object(f))?;

    let h = host.clone();
    let f = engine.create_function("clearInterval", Rc::new(move |engine, _, args| cancel(&h, engine, args)))?;
    engine.set(&global, "clearInterval", ScriptValue::Object(f))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(s: &str) -> TimerCallback {
        TimerCallback::Source(s.to_string())
    }

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_timer_manager() {
        let mut tm = TimerManager::new();

        let id1 = tm.set_timeout(src("cb1"), 100 * MS, Duration::ZERO);
        let id2 = tm.set_timeout(src("cb2"), 200 * MS, Duration::ZERO);

        assert!(tm.has_pending());
        assert_eq!(tm.time_until_next(Duration::ZERO), Some(100 * MS));

        assert_eq!(tm.clear(id1), Some(src("cb1")));
        assert!(tm.has_pending()); // Still has id2

        tm.clear(id2);
        assert!(!tm.has_pending());
    }

    #[test]
    fn test_due_order() {
        let mut tm = TimerManager::new();
        let late = tm.set_timeout(src("late"), 20 * MS, Duration::ZERO);
        let early = tm.set_timeout(src("early"), 10 * MS, Duration::ZERO);
        assert!(tm.collect_due(5 * MS).is_empty());
        assert_eq!(tm.collect_due(30 * MS), vec![early, late]);
        // Already queued
        assert!(tm.collect_due(30 * MS).is_empty());
    }

    #[test]
    fn test_one_shot_lifecycle() {
        let mut tm = TimerManager::new();
        let id = tm.set_timeout(src("x"), Duration::ZERO, Duration::ZERO);
        assert_eq!(tm.collect_due(Duration::ZERO), vec![id]);
        assert_eq!(tm.start(id), Some(src("x")));
        assert_eq!(tm.get(id).map(|t| t.state), Some(TimerState::Fired));
        assert_eq!(tm.finish(id, Duration::ZERO), Some(src("x")));

        // Clearing a fired one-shot is a no-op
        assert_eq!(tm.clear(id), None);
        assert!(!tm.has_pending());
    }

    #[test]
    fn test_cancel_while_queued() {
        let mut tm = TimerManager::new();
        let id = tm.set_timeout(src("x"), Duration::ZERO, Duration::ZERO);
        tm.collect_due(Duration::ZERO);
        assert_eq!(tm.clear(id), None);
        assert_eq!(tm.start(id), None);
        assert_eq!(tm.finish(id, Duration::ZERO), Some(src("x")));
        assert!(tm.get(id).is_none());
    }

    #[test]
    fn test_interval() {
        let mut tm = TimerManager::new();
        let id = tm.set_interval(src("repeat"), 50 * MS, Duration::ZERO);

        tm.collect_due(50 * MS);
        tm.start(id);
        assert_eq!(tm.finish(id, 50 * MS), None);
        assert_eq!(tm.get(id).map(|t| t.due), Some(100 * MS));

        // Cleared from inside its own callback
        tm.collect_due(100 * MS);
        tm.start(id);
        assert_eq!(tm.clear(id), None);
        assert_eq!(tm.finish(id, 100 * MS), Some(src("repeat")));
        assert!(!tm.has_pending());
    }
}
