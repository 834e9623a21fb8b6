//! Scripted Loader
//!
//! In-memory loader that records requests and lets the caller drive each
//! load's events by hand. Used in tests and for offline pages.

use std::cell::{Cell, RefCell};

use tracing::debug;

use crate::{Completion, LoadEvent, LoadHandle, Loader, LoaderConfig, NetError, Request, ResponseHead};

struct PendingLoad {
    handle: LoadHandle,
    request: Request,
    completion: Option<Completion>,
    cancelled: bool,
}

/// Loader whose responses are supplied by the caller
#[derive(Default)]
pub struct ScriptedLoader {
    config: LoaderConfig,
    loads: RefCell<Vec<PendingLoad>>,
    next_handle: Cell<u64>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        Self { config, ..Self::default() }
    }

    /// Every request seen so far, after defaults were applied
    pub fn requests(&self) -> Vec<Request> {
        self.loads.borrow().iter().map(|l| l.request.clone()).collect()
    }

    /// Request of a load
    pub fn request(&self, handle: LoadHandle) -> Option<Request> {
        self.loads.borrow().iter().find(|l| l.handle == handle).map(|l| l.request.clone())
    }

    /// Most recent load
    pub fn last_handle(&self) -> Option<LoadHandle> {
        self.loads.borrow().last().map(|l| l.handle)
    }

    pub fn is_cancelled(&self, handle: LoadHandle) -> bool {
        self.loads.borrow().iter().any(|l| l.handle == handle && l.cancelled)
    }

    /// Deliver one event. Returns `false` for unknown or finished loads.
    pub fn emit(&self, handle: LoadHandle, event: LoadEvent) -> bool {
        let finished = matches!(event, LoadEvent::Done | LoadEvent::Timeout | LoadEvent::Error(_));
        // The completion is taken out so it may call back into the loader.
        let completion = {
            let mut loads = self.loads.borrow_mut();
            loads.iter_mut().find(|l| l.handle == handle).and_then(|l| l.completion.take())
        };
        let Some(mut completion) = completion else {
            return false;
        };
        completion(event);
        if !finished {
            let mut loads = self.loads.borrow_mut();
            if let Some(load) = loads.iter_mut().find(|l| l.handle == handle) {
                load.completion = Some(completion);
            }
        }
        true
    }

    /// Deliver a whole response: head, body, done
    pub fn respond(&self, handle: LoadHandle, raw_head: &str, body: &[u8]) -> Result<(), NetError> {
        let head = ResponseHead::parse(raw_head)?;
        self.emit(handle, LoadEvent::Headers(head));
        if !body.is_empty() {
            self.emit(handle, LoadEvent::Data(body.to_vec()));
        }
        self.emit(handle, LoadEvent::Done);
        Ok(())
    }

    pub fn time_out(&self, handle: LoadHandle) -> bool {
        self.emit(handle, LoadEvent::Timeout)
    }

    pub fn fail(&self, handle: LoadHandle, message: &str) -> bool {
        self.emit(handle, LoadEvent::Error(NetError::Network(message.to_string())))
    }
}

impl Loader for ScriptedLoader {
    fn load(&self, request: Request, completion: Completion) -> LoadHandle {
        let handle = LoadHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        let request = self.config.prepare(request);
        debug!("Scripted load {:?}: {} {}", handle, request.method.as_str(), request.url);
        self.loads.borrow_mut().push(PendingLoad {
            handle,
            request,
            completion: Some(completion),
            cancelled: false,
        });
        handle
    }

    fn cancel(&self, handle: LoadHandle) {
        if let Some(load) = self.loads.borrow_mut().iter_mut().find(|l| l.handle == handle) {
            load.cancelled = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use std::rc::Rc;
    use url::Url;

    #[test]
    fn test_events_reach_completion() {
        let loader = ScriptedLoader::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let handle = loader.load(
            Request::get(Url::parse("http://example.com/").unwrap()),
            Box::new(move |event| {
                sink.borrow_mut().push(match event {
                    LoadEvent::Headers(h) => format!("headers {}", h.status),
                    LoadEvent::Data(d) => format!("data {}", d.len()),
                    LoadEvent::Done => "done".to_string(),
                    LoadEvent::Timeout => "timeout".to_string(),
                    LoadEvent::Error(e) => format!("error {}", e),
                })
            }),
        );

        loader.respond(handle, "HTTP/1.1 200 OK\r\n\r\n", b"hello").unwrap();
        assert_eq!(*seen.borrow(), vec!["headers 200", "data 5", "done"]);

        // Finished loads accept nothing further
        assert!(!loader.emit(handle, LoadEvent::Done));
    }

    #[test]
    fn test_requests_get_defaults() {
        let loader = ScriptedLoader::new();
        loader.load(Request::new(Method::Head, Url::parse("http://example.com/").unwrap()), Box::new(|_| {}));
        let requests = loader.requests();
        assert_eq!(requests[0].method, Method::Head);
        assert!(requests[0].header("user-agent").is_some());
    }

    #[test]
    fn test_cancel_is_recorded() {
        let loader = ScriptedLoader::new();
        let handle = loader.load(Request::get(Url::parse("http://example.com/").unwrap()), Box::new(|_| {}));
        loader.cancel(handle);
        assert!(loader.is_cancelled(handle));
    }
}
