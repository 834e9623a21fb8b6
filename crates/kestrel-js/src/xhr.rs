//! XMLHttpRequest State
//!
//! Native side of script-created requests. Network events never touch script:
//! the loader completion pushes [`NetStep`]s into a shared inbox, and the
//! bottom-half queue later turns each step into ready-state transitions with
//! the events they fire.

use std::time::Duration;

use kestrel_net::{LoadEvent, LoadHandle, Method, Request, ResponseHeaders, Url, is_forbidden_header, is_valid_header_name, normalize_value};
use tracing::debug;

use crate::engine::RootId;
use crate::error::ScriptError;

/// Identity of an XHR object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XhrId(pub(crate) u64);

/// XHR ready states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum ReadyState {
    #[default]
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

impl ReadyState {
    pub const ALL: [(&'static str, ReadyState); 5] = [
        ("UNSENT", ReadyState::Unsent),
        ("OPENED", ReadyState::Opened),
        ("HEADERS_RECEIVED", ReadyState::HeadersReceived),
        ("LOADING", ReadyState::Loading),
        ("DONE", ReadyState::Done),
    ];
}

/// Events delivered to an XHR object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XhrEvent {
    ReadyStateChange,
    LoadStart,
    Progress,
    Load,
    LoadEnd,
    Timeout,
    Error,
    Abort,
}

impl XhrEvent {
    /// Event type name
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadyStateChange => "readystatechange",
            Self::LoadStart => "loadstart",
            Self::Progress => "progress",
            Self::Load => "load",
            Self::LoadEnd => "loadend",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::Abort => "abort",
        }
    }

    pub const HANDLERS: [&'static str; 8] = [
        "onreadystatechange",
        "onloadstart",
        "onprogress",
        "onload",
        "onloadend",
        "ontimeout",
        "onerror",
        "onabort",
    ];
}

/// A loader event tagged with the request generation it belongs to
#[derive(Debug)]
pub struct NetStep {
    pub xhr: XhrId,
    pub seq: u64,
    pub event: LoadEvent,
}

/// One event to fire, optionally entering a ready state first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub enter: Option<ReadyState>,
    pub event: XhrEvent,
}

impl Transition {
    pub(crate) fn enter(state: ReadyState) -> Self {
        Self { enter: Some(state), event: XhrEvent::ReadyStateChange }
    }

    pub(crate) fn fire(event: XhrEvent) -> Self {
        Self { enter: None, event }
    }
}

/// Terminal outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Load,
    Timeout,
    Error,
    Abort,
}

/// Methods a script may open a request with
fn parse_method(method: &str) -> Option<Method> {
    match Method::parse(method)? {
        m @ (Method::Get | Method::Head | Method::Post) => Some(m),
        _ => None,
    }
}

/// Native state of one XMLHttpRequest
#[derive(Debug, Default)]
pub struct XhrState {
    pub ready_state: ReadyState,
    pub method: Method,
    pub url: Option<Url>,
    pub request_headers: Vec<(String, String)>,
    pub status: u16,
    pub status_text: String,
    pub response_headers: ResponseHeaders,
    pub response: Vec<u8>,
    pub timeout_ms: u64,
    pub with_credentials: bool,
    /// `send()` was called and the request has not finished
    pub in_flight: bool,
    pub load: Option<LoadHandle>,
    /// Request generation; bumped by `open()` and `abort()`
    pub seq: u64,
    /// `addEventListener` callbacks
    pub listeners: Vec<(String, RootId)>,
    /// Root keeping the script object alive while events are outstanding
    pub keep_alive: Option<RootId>,
}

impl XhrState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for `open()` and enter OPENED. Returns the load to cancel, if
    /// one was running.
    pub fn open(&mut self, method: &str, url: Url) -> Result<Option<LoadHandle>, ScriptError> {
        let method = parse_method(method)
            .ok_or_else(|| ScriptError::type_error(format!("unsupported request method '{}'", method)))?;
        let previous = self.load.take();
        self.seq += 1;
        self.method = method;
        self.url = Some(url);
        self.request_headers.clear();
        self.status = 0;
        self.status_text.clear();
        self.response_headers = ResponseHeaders::new();
        self.response.clear();
        self.in_flight = false;
        self.ready_state = ReadyState::Opened;
        Ok(previous)
    }

    /// `setRequestHeader()`. Forbidden names are dropped.
    pub fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), ScriptError> {
        if self.ready_state != ReadyState::Opened || self.in_flight {
            return Err(ScriptError::type_error("setRequestHeader called outside the OPENED state"));
        }
        if !is_valid_header_name(name) {
            return Err(ScriptError::type_error(format!("invalid header name '{}'", name)));
        }
        if is_forbidden_header(name) {
            debug!("Ignoring forbidden request header {}", name);
            return Ok(());
        }
        let value = normalize_value(value);
        match self.request_headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.request_headers.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// Build the request for `send()`
    pub fn request(&self, body: Option<String>, referrer: Option<Url>) -> Result<Request, ScriptError> {
        if self.ready_state != ReadyState::Opened || self.in_flight {
            return Err(ScriptError::type_error("send called outside the OPENED state"));
        }
        let url = self.url.clone().ok_or_else(|| ScriptError::internal("opened request without URL"))?;
        let mut request = Request::new(self.method, url).with_referrer(referrer);
        for (name, value) in &self.request_headers {
            request = request.with_header(name, value);
        }
        if self.method == Method::Post {
            if let Some(body) = body {
                request = request.with_body(body.into_bytes());
            }
        }
        if self.timeout_ms > 0 {
            request = request.with_timeout(Duration::from_millis(self.timeout_ms));
        }
        Ok(request)
    }

    /// Response header, case-insensitive; nothing before headers arrived
    pub fn response_header(&self, name: &str) -> Option<&str> {
        if self.ready_state < ReadyState::HeadersReceived {
            return None;
        }
        self.response_headers.get(name)
    }

    pub fn all_response_headers(&self) -> String {
        if self.ready_state < ReadyState::HeadersReceived {
            return String::new();
        }
        self.response_headers.to_raw()
    }

    /// Body as text once loading started
    pub fn response_text(&self) -> String {
        if self.ready_state < ReadyState::Loading {
            return String::new();
        }
        String::from_utf8_lossy(&self.response).into_owned()
    }

    /// `abort()`. An in-flight request is finished as aborted and its late
    /// events are superseded; a finished one goes back to UNSENT silently.
    pub fn abort(&mut self) -> (Option<LoadHandle>, Vec<Transition>) {
        if !self.in_flight {
            if self.ready_state == ReadyState::Done {
                self.ready_state = ReadyState::Unsent;
            }
            return (None, Vec::new());
        }
        let load = self.load.take();
        self.seq += 1;
        let steps = self.finish(Outcome::Abort);
        self.ready_state = ReadyState::Done;
        (load, steps)
    }

    /// Transitions that finish the request, passing through skipped states
    pub fn finish(&mut self, outcome: Outcome) -> Vec<Transition> {
        let mut steps = Vec::new();
        if outcome == Outcome::Load {
            if self.ready_state < ReadyState::HeadersReceived {
                if self.status == 0 {
                    self.status = 200;
                }
                steps.push(Transition::enter(ReadyState::HeadersReceived));
            }
            if self.ready_state < ReadyState::Loading {
                steps.push(Transition::enter(ReadyState::Loading));
            }
        }
        steps.push(Transition::enter(ReadyState::Done));
        steps.push(Transition::fire(match outcome {
            Outcome::Load => XhrEvent::Load,
            Outcome::Timeout => XhrEvent::Timeout,
            Outcome::Error => XhrEvent::Error,
            Outcome::Abort => XhrEvent::Abort,
        }));
        steps.push(Transition::fire(XhrEvent::LoadEnd));
        self.in_flight = false;
        self.load = None;
        steps
    }

    /// Turn a loader event into transitions. Stale or late events give none.
    pub fn apply(&mut self, seq: u64, event: LoadEvent) -> Vec<Transition> {
        if seq != self.seq || !self.in_flight {
            debug!("Discarding stale network event for request generation {}", seq);
            return Vec::new();
        }
        match event {
            LoadEvent::Headers(head) => {
                if self.ready_state >= ReadyState::HeadersReceived {
                    return Vec::new();
                }
                self.status = head.status;
                self.status_text = head.status_text;
                self.response_headers = head.headers;
                vec![Transition::enter(ReadyState::HeadersReceived)]
            }
            LoadEvent::Data(chunk) => {
                self.response.extend_from_slice(&chunk);
                let mut steps = Vec::new();
                if self.ready_state < ReadyState::HeadersReceived {
                    self.status = 200;
                    steps.push(Transition::enter(ReadyState::HeadersReceived));
                }
                if self.ready_state < ReadyState::Loading {
                    steps.push(Transition::enter(ReadyState::Loading));
                }
                steps.push(Transition::fire(XhrEvent::Progress));
                steps
            }
            LoadEvent::Done => self.finish(Outcome::Load),
            LoadEvent::Timeout => self.finish(Outcome::Timeout),
            LoadEvent::Error(err) => {
                debug!("Request failed: {}", err);
                self.finish(Outcome::Error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_net::ResponseHead;

    fn opened() -> XhrState {
        let mut xhr = XhrState::new();
        xhr.open("post", Url::parse("http://example.com/api").unwrap()).unwrap();
        xhr
    }

    fn states(steps: &[Transition]) -> Vec<ReadyState> {
        steps.iter().filter_map(|t| t.enter).collect()
    }

    #[test]
    fn test_method_validation() {
        let mut xhr = XhrState::new();
        let url = Url::parse("http://example.com/").unwrap();
        assert!(xhr.open("HEAD", url.clone()).is_ok());
        assert!(matches!(xhr.open("PUT", url.clone()), Err(ScriptError::Type(_))));
        assert!(matches!(xhr.open("bogus", url), Err(ScriptError::Type(_))));
    }

    #[test]
    fn test_request_headers() {
        let mut xhr = opened();
        xhr.set_request_header("X-A", " one\t").unwrap();
        xhr.set_request_header("x-a", "two").unwrap();
        xhr.set_request_header("Cookie", "secret").unwrap();
        assert!(matches!(xhr.set_request_header("bad name", "v"), Err(ScriptError::Type(_))));
        assert_eq!(xhr.request_headers, vec![("X-A".to_string(), "one, two".to_string())]);

        let request = xhr.request(Some("payload".into()), None).unwrap();
        assert_eq!(request.header("x-a"), Some("one, two"));
        assert_eq!(request.body_text(), Some("payload"));
    }

    #[test]
    fn test_full_sequence() {
        let mut xhr = opened();
        xhr.in_flight = true;
        let seq = xhr.seq;

        let head = ResponseHead::parse("HTTP/1.1 201 Created\r\nX-Test: a\r\n").unwrap();
        assert_eq!(states(&xhr.apply(seq, LoadEvent::Headers(head))), vec![ReadyState::HeadersReceived]);
        xhr.ready_state = ReadyState::HeadersReceived;

        let steps = xhr.apply(seq, LoadEvent::Data(b"ok".to_vec()));
        assert_eq!(states(&steps), vec![ReadyState::Loading]);
        xhr.ready_state = ReadyState::Loading;

        let steps = xhr.apply(seq, LoadEvent::Done);
        assert_eq!(states(&steps), vec![ReadyState::Done]);
        let events: Vec<_> = steps.iter().map(|t| t.event).collect();
        assert_eq!(events, vec![XhrEvent::ReadyStateChange, XhrEvent::Load, XhrEvent::LoadEnd]);
        assert_eq!(xhr.status, 201);
        assert!(!xhr.in_flight);
    }

    #[test]
    fn test_early_done_passes_through() {
        let mut xhr = opened();
        xhr.in_flight = true;
        let seq = xhr.seq;
        let steps = xhr.apply(seq, LoadEvent::Done);
        assert_eq!(states(&steps), vec![ReadyState::HeadersReceived, ReadyState::Loading, ReadyState::Done]);
    }

    #[test]
    fn test_timeout_sequence() {
        let mut xhr = opened();
        xhr.in_flight = true;
        let seq = xhr.seq;
        let events: Vec<_> = xhr.apply(seq, LoadEvent::Timeout).iter().map(|t| t.event).collect();
        assert_eq!(events, vec![XhrEvent::ReadyStateChange, XhrEvent::Timeout, XhrEvent::LoadEnd]);
    }

    #[test]
    fn test_abort() {
        let mut xhr = opened();
        assert_eq!(xhr.ready_state, ReadyState::Opened);
        xhr.in_flight = true;
        xhr.load = Some(LoadHandle(7));
        let seq = xhr.seq;

        let (load, steps) = xhr.abort();
        assert_eq!(load, Some(LoadHandle(7)));
        let events: Vec<_> = steps.iter().map(|t| t.event).collect();
        assert_eq!(events, vec![XhrEvent::ReadyStateChange, XhrEvent::Abort, XhrEvent::LoadEnd]);
        assert!(xhr.seq > seq);
        assert!(xhr.apply(seq, LoadEvent::Done).is_empty());

        // Nothing in flight: DONE goes back to UNSENT without events
        xhr.ready_state = ReadyState::Done;
        let (load, steps) = xhr.abort();
        assert!(load.is_none() && steps.is_empty());
        assert_eq!(xhr.ready_state, ReadyState::Unsent);
    }

    #[test]
    fn test_stale_events_discarded() {
        let mut xhr = opened();
        xhr.in_flight = true;
        let old = xhr.seq;
        xhr.open("GET", Url::parse("http://example.com/other").unwrap()).unwrap();
        assert!(xhr.apply(old, LoadEvent::Done).is_empty());
    }
}
