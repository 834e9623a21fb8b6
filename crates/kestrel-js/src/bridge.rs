//! Async Bridge
//!
//! Bottom-half queue that makes timers, XMLHttpRequest and postMessage look
//! asynchronous on a single thread. Nothing here calls into script on its
//! own: results pile up in the queue and the inbox, and script only runs when
//! the host calls [`run_bottom_halves`].

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use kestrel_net::LoadHandle;
use tracing::{debug, error, trace, warn};

use crate::engine::{RootId, ScriptEngine, Value};
use crate::error::ScriptError;
use crate::host::Host;
use crate::registry::BindingKey;
use crate::timers::{TimerCallback, TimerId, TimerManager};
use crate::value::ScriptValue;
use crate::xhr::{NetStep, ReadyState, Transition, XhrEvent, XhrId, XhrState};

/// Queued unit of work
#[derive(Debug)]
pub(crate) enum Task {
    Timer(TimerId),
    /// Raw loader event, planned into transitions when dequeued
    Net(NetStep),
    Xhr { xhr: XhrId, seq: u64, step: Transition },
    Message { data: RootId, origin: String },
}

/// Bridge state owned by one interpreter context
#[derive(Debug, Default)]
pub(crate) struct Bridge {
    now: Duration,
    pub(crate) timers: TimerManager,
    xhrs: HashMap<XhrId, XhrState>,
    next_xhr: u64,
    queue: VecDeque<Task>,
    inbox: Rc<RefCell<Vec<NetStep>>>,
    /// `window.addEventListener` callbacks
    pub(crate) window_listeners: Vec<(String, RootId)>,
    running: bool,
}

impl Bridge {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Virtual time since the context was created
    pub(crate) fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock forward and queue every timer that became due
    pub(crate) fn advance(&mut self, by: Duration) -> usize {
        self.now += by;
        let due = self.timers.collect_due(self.now);
        let count = due.len();
        self.queue.extend(due.into_iter().map(Task::Timer));
        count
    }

    /// Shared sink for loader completions
    pub(crate) fn inbox(&self) -> Rc<RefCell<Vec<NetStep>>> {
        self.inbox.clone()
    }

    pub(crate) fn push(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    fn pop(&mut self) -> Option<Task> {
        let arrived: Vec<NetStep> = self.inbox.borrow_mut().drain(..).collect();
        self.queue.extend(arrived.into_iter().map(Task::Net));
        self.queue.pop_front()
    }

    pub(crate) fn create_xhr(&mut self) -> XhrId {
        self.next_xhr += 1;
        let id = XhrId(self.next_xhr);
        self.xhrs.insert(id, XhrState::new());
        id
    }

    pub(crate) fn xhr(&self, id: XhrId) -> Option<&XhrState> {
        self.xhrs.get(&id)
    }

    pub(crate) fn xhr_mut(&mut self, id: XhrId) -> Option<&mut XhrState> {
        self.xhrs.get_mut(&id)
    }

    /// Forget an XHR whose script object is gone. Returns roots to release and
    /// the load to cancel.
    pub(crate) fn remove_xhr(&mut self, id: XhrId) -> (Vec<RootId>, Option<LoadHandle>) {
        match self.xhrs.remove(&id) {
            Some(state) => {
                let mut roots: Vec<RootId> = state.listeners.into_iter().map(|(_, r)| r).collect();
                roots.extend(state.keep_alive);
                (roots, state.load)
            }
            None => (Vec::new(), None),
        }
    }

    /// Timers plus requests still in flight
    pub(crate) fn pending_operations(&self) -> usize {
        self.timers.pending() + self.xhrs.values().filter(|x| x.in_flight).count()
    }

    pub(crate) fn has_pending_work(&self) -> bool {
        !self.queue.is_empty() || !self.inbox.borrow().is_empty() || self.pending_operations() > 0
    }

    /// Drop everything. Returns roots to release and loads to cancel.
    pub(crate) fn teardown(&mut self) -> (Vec<RootId>, Vec<LoadHandle>) {
        let mut roots: Vec<RootId> = self.timers.drain().iter().filter_map(TimerCallback::root).collect();
        roots.extend(self.window_listeners.drain(..).map(|(_, r)| r));
        let mut loads = Vec::new();
        let ids: Vec<XhrId> = self.xhrs.keys().copied().collect();
        for id in ids {
            let (r, load) = self.remove_xhr(id);
            roots.extend(r);
            loads.extend(load);
        }
        for task in self.queue.drain(..) {
            if let Task::Message { data, .. } = task {
                roots.push(data);
            }
        }
        self.inbox.borrow_mut().clear();
        (roots, loads)
    }
}

/// Swallow an error script could have caught, keep internal faults
fn settle(result: Result<(), ScriptError>, what: &str) -> Result<(), ScriptError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_catchable() => {
            warn!("Uncaught {} in {}", err, what);
            Ok(())
        }
        Err(err) => {
            error!("Internal fault in {}: {}", what, err);
            Err(err)
        }
    }
}

fn call<E: ScriptEngine>(
    engine: &mut E,
    function: &Value<E>,
    this: &Value<E>,
    args: &[Value<E>],
    what: &str,
) -> Result<(), ScriptError> {
    settle(engine.call(function, this, args).map(|_| ()), what)
}

/// Plain `{type, ...}` event object
pub(crate) fn event_object<E: ScriptEngine>(
    engine: &mut E,
    kind: &str,
    fields: &[(&str, Value<E>)],
) -> Result<Value<E>, ScriptError> {
    let event = engine.create_object()?;
    engine.set(&event, "type", ScriptValue::from(kind))?;
    for (name, value) in fields {
        engine.set(&event, name, value.clone())?;
    }
    Ok(ScriptValue::Object(event))
}

/// Run queued bottom halves until the queue is empty.
///
/// Re-entrant calls return immediately. Script errors are logged and do not
/// stop the remaining work; internal faults stop it and are returned.
pub(crate) fn run_bottom_halves<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E) -> Result<usize, ScriptError> {
    {
        let mut bridge = host.bridge.borrow_mut();
        if bridge.running {
            trace!("Nested bottom-half run ignored");
            return Ok(0);
        }
        bridge.running = true;
    }
    let result = drive(host, engine);
    host.bridge.borrow_mut().running = false;
    result
}

fn drive<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E) -> Result<usize, ScriptError> {
    let mut ran = 0;
    loop {
        let task = host.bridge.borrow_mut().pop();
        let Some(task) = task else { break };
        host.registry.borrow_mut().flush(engine);
        ran += 1;
        match task {
            Task::Timer(id) => fire_timer(host, engine, id)?,
            Task::Net(step) => plan_step(host, step),
            Task::Xhr { xhr, seq, step } => dispatch_xhr(host, engine, xhr, seq, step)?,
            Task::Message { data, origin } => deliver_message(host, engine, data, origin)?,
        }
    }
    if ran > 0 {
        debug!("Ran {} bottom halves", ran);
    }
    Ok(ran)
}

fn fire_timer<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E, id: TimerId) -> Result<(), ScriptError> {
    let callback = host.bridge.borrow_mut().timers.start(id);
    let result = match &callback {
        Some(TimerCallback::Function(root)) => match engine.root_value(*root) {
            Some(function) => call(engine, &function, &ScriptValue::Undefined, &[], "timer callback"),
            None => Err(ScriptError::internal(format!("timer {:?} lost its callback", id))),
        },
        Some(TimerCallback::Source(source)) => settle(engine.eval(source).map(|_| ()), "timer source"),
        None => Ok(()),
    };
    let released = {
        let mut bridge = host.bridge.borrow_mut();
        let now = bridge.now();
        bridge.timers.finish(id, now)
    };
    if let Some(root) = released.as_ref().and_then(TimerCallback::root) {
        engine.remove_root(root);
    }
    result
}

fn plan_step<E: ScriptEngine>(host: &Host<E>, step: NetStep) {
    let mut bridge = host.bridge.borrow_mut();
    let Some(state) = bridge.xhr_mut(step.xhr) else {
        trace!("Network event for forgotten request {:?}", step.xhr);
        return;
    };
    let seq = state.seq;
    let transitions = state.apply(step.seq, step.event);
    // Transitions of one step run back to back, ahead of later work
    for transition in transitions.into_iter().rev() {
        bridge.queue.push_front(Task::Xhr { xhr: step.xhr, seq, step: transition });
    }
}

fn dispatch_xhr<E: ScriptEngine>(
    host: &Rc<Host<E>>,
    engine: &mut E,
    id: XhrId,
    seq: u64,
    step: Transition,
) -> Result<(), ScriptError> {
    let name = step.event.name();
    let listeners: Vec<RootId> = {
        let mut bridge = host.bridge.borrow_mut();
        let Some(state) = bridge.xhr_mut(id) else { return Ok(()) };
        if state.seq != seq {
            trace!("Dropping {} of superseded request {:?}", name, id);
            return Ok(());
        }
        if let Some(ready_state) = step.enter {
            state.ready_state = ready_state;
        }
        state.listeners.iter().filter(|(t, _)| t == name).map(|(_, r)| *r).collect()
    };

    let target = host.registry.borrow_mut().handle_of(BindingKey::Xhr(id));
    let result = match target {
        Some(target) => fire_xhr(engine, &target, name, &listeners),
        None => Ok(()),
    };

    // The object stays rooted until its last outstanding event
    let keep_alive = host.bridge.borrow_mut().xhr_mut(id).and_then(|state| {
        let settled = step.event == XhrEvent::LoadEnd || (step.enter == Some(ReadyState::Opened) && !state.in_flight);
        if settled { state.keep_alive.take() } else { None }
    });
    if let Some(root) = keep_alive {
        engine.remove_root(root);
    }
    result
}

fn fire_xhr<E: ScriptEngine>(
    engine: &mut E,
    target: &E::Object,
    name: &str,
    listeners: &[RootId],
) -> Result<(), ScriptError> {
    let this = ScriptValue::Object(target.clone());
    let event = match event_object(engine, name, &[("target", this.clone())]) {
        Ok(event) => event,
        Err(err) => return settle(Err(err), "xhr event"),
    };
    let handler = engine.get(target, &format!("on{}", name));
    match handler {
        Ok(handler) if engine.is_callable(&handler) => {
            call(engine, &handler, &this, std::slice::from_ref(&event), name)?;
        }
        Ok(_) => {}
        Err(err) => settle(Err(err), name)?,
    }
    for root in listeners {
        if let Some(listener) = engine.root_value(*root) {
            call(engine, &listener, &this, std::slice::from_ref(&event), name)?;
        }
    }
    Ok(())
}

fn deliver_message<E: ScriptEngine>(
    host: &Rc<Host<E>>,
    engine: &mut E,
    data: RootId,
    origin: String,
) -> Result<(), ScriptError> {
    let value = engine.root_value(data).unwrap_or_default();
    engine.remove_root(data);

    let global = engine.global();
    let window = ScriptValue::Object(global.clone());
    let fields = [("data", value), ("origin", ScriptValue::from(origin)), ("source", window.clone())];
    let event = match event_object(engine, "message", &fields) {
        Ok(event) => event,
        Err(err) => return settle(Err(err), "message event"),
    };

    match engine.get(&global, "onmessage") {
        Ok(handler) if engine.is_callable(&handler) => {
            call(engine, &handler, &window, std::slice::from_ref(&event), "onmessage")?;
        }
        Ok(_) => {}
        Err(err) => settle(Err(err), "onmessage")?,
    }

    let listeners: Vec<RootId> = host
        .bridge
        .borrow()
        .window_listeners
        .iter()
        .filter(|(t, _)| t == "message")
        .map(|(_, r)| *r)
        .collect();
    for root in listeners {
        if let Some(listener) = engine.root_value(root) {
            call(engine, &listener, &window, std::slice::from_ref(&event), "message listener")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_queues_due_timers() {
        let mut bridge = Bridge::new();
        let now = bridge.now();
        bridge.timers.set_timeout(TimerCallback::Source("a".into()), Duration::from_millis(10), now);
        assert_eq!(bridge.advance(Duration::from_millis(5)), 0);
        assert_eq!(bridge.advance(Duration::from_millis(5)), 1);
        assert!(matches!(bridge.pop(), Some(Task::Timer(_))));
        assert!(bridge.pop().is_none());
    }

    #[test]
    fn test_inbox_feeds_queue() {
        let mut bridge = Bridge::new();
        let id = bridge.create_xhr();
        bridge.inbox().borrow_mut().push(NetStep { xhr: id, seq: 1, event: kestrel_net::LoadEvent::Done });
        assert!(bridge.has_pending_work());
        assert!(matches!(bridge.pop(), Some(Task::Net(_))));
        assert!(!bridge.has_pending_work());
    }

    #[test]
    fn test_teardown_returns_roots() {
        let mut bridge = Bridge::new();
        let now = bridge.now();
        bridge.timers.set_interval(TimerCallback::Function(RootId(3)), Duration::from_millis(10), now);
        bridge.window_listeners.push(("message".into(), RootId(4)));
        bridge.push(Task::Message { data: RootId(5), origin: "null".into() });
        let (mut roots, loads) = bridge.teardown();
        roots.sort();
        assert_eq!(roots, vec![RootId(3), RootId(4), RootId(5)]);
        assert!(loads.is_empty());
        assert!(!bridge.has_pending_work());
    }
}
