use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebtapError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("CDP call {method} timed out after {elapsed:?}")]
    Timeout { method: String, elapsed: Duration },

    #[error("CDP error from {method}: {message}")]
    Cdp { method: String, message: String },

    #[error(
        "Cannot connect to browser at {cdp_url}\n\n\
         Make sure Chrome/Chromium is running with remote debugging enabled:\n\
         \x20 chrome --remote-debugging-port={port}\n\n\
         Or launch a managed profile:\n\
         \x20 webtap launch"
    )]
    BrowserUnreachable { cdp_url: String, port: u16 },

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Navigation to {url} did not finish loading in time (the page may still be usable)")]
    NavigationTimeout { url: String },

    #[error("Element [{0}] is stale — the page changed since the last scan. Re-scan and retry.")]
    StaleIndex(usize),

    #[error("Element index {index} out of range (catalog has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Element [{index}] is not interactable: {reason}")]
    ElementNotInteractable { index: usize, reason: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript error: {0}")]
    Evaluation(String),

    #[error(
        "Failed to launch Chrome: {0}\n\n\
         Chrome not found? You can:\n\
         \x20 - Install Chrome: https://www.google.com/chrome/\n\
         \x20 - Ubuntu/Debian: sudo apt install chromium-browser\n\
         \x20 - Fedora: sudo dnf install chromium\n\
         \x20 - macOS: brew install --cask google-chrome\n\
         \x20 - Or pass an explicit path with --chrome-path"
    )]
    LaunchFailed(String),

    #[error(
        "Profile '{name}' is already running on port {port}.\n\
         Connect to it instead of launching a second instance."
    )]
    ProfileInUse { name: String, port: u16 },

    #[error("Profile error: {0}")]
    Profile(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WebtapError>;
