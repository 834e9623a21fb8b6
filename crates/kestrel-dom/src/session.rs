//! Session Requests
//!
//! Side effects a document asks of its session. Scripts never navigate or
//! open dialogs synchronously; they record a request and the session carries
//! it out on its own schedule.

use crate::form::FormSubmission;
use url::Url;

/// Request recorded for the owning session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionRequest {
    /// Load a new URL into this view
    Navigate { url: Url, replace: bool },
    /// Reload the current URL
    Reload,
    /// Submit a form
    Submit(FormSubmission),
    /// Show a message box
    Alert(String),
    /// Open a URL in another window or tab
    OpenWindow { url: Url, target: String },
}
