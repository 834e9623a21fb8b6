//! Kestrel Networking
//!
//! The loader contract the script layer talks to. Transport lives behind
//! [`Loader`]; completions are reported as a stream of [`LoadEvent`]s on the
//! browser's single thread.

mod headers;
mod loader;
mod scripted;

pub use headers::{FORBIDDEN_HEADERS, ResponseHead, ResponseHeaders, is_forbidden_header, is_valid_header_name, normalize_value};
pub use loader::{LoaderConfig, Method, Request};
pub use scripted::ScriptedLoader;
pub use url::Url;

/// Handle of an in-flight load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadHandle(pub u64);

/// Progress of a load as reported by the loader
#[derive(Debug)]
pub enum LoadEvent {
    /// Status line and headers arrived
    Headers(ResponseHead),
    /// A chunk of body
    Data(Vec<u8>),
    /// The body is complete
    Done,
    /// The request ran past its timeout
    Timeout,
    /// The request failed
    Error(NetError),
}

/// Completion callback. Called on the browser thread, possibly many times.
pub type Completion = Box<dyn FnMut(LoadEvent)>;

/// Resource loader
pub trait Loader {
    /// Start a load. Events for it are delivered to `completion`.
    fn load(&self, request: Request, completion: Completion) -> LoadHandle;

    /// Stop a load. Advisory: events may still arrive afterwards.
    fn cancel(&self, handle: LoadHandle);
}

/// Network error
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Request refused: {0}")]
    Refused(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid loader configuration: {0}")]
    Config(#[from] serde_json::Error),
}
