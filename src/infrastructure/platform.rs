use crate::domain::ports::Platform;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

fn scheme(uri: &str) -> Option<&str> {
    uri.split_once(':').map(|(scheme, _)| scheme)
}

/// Hands payment links to the person at the terminal.
///
/// A URI counts as openable when its scheme is one of the configured ones.
#[derive(Debug, Clone)]
pub struct ConsolePlatform {
    schemes: Vec<String>,
}

impl ConsolePlatform {
    pub fn new(schemes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            schemes: schemes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Platform for ConsolePlatform {
    fn can_open(&self, uri: &str) -> bool {
        scheme(uri).is_some_and(|s| self.schemes.iter().any(|h| h.eq_ignore_ascii_case(s)))
    }

    fn open(&self, uri: &str) {
        tracing::info!(uri, "handing payment off to external application");
        println!("Complete the payment in your payment app: {uri}");
    }
}

/// Records every URI it is asked to open.
#[derive(Debug, Clone)]
pub struct RecordingPlatform {
    available: Arc<AtomicBool>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self {
            available: Arc::new(AtomicBool::new(true)),
            opened: Arc::default(),
        }
    }
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform with no application able to handle any URI.
    pub fn without_handler() -> Self {
        let platform = Self::default();
        platform.available.store(false, Ordering::SeqCst);
        platform
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Platform for RecordingPlatform {
    fn can_open(&self, _uri: &str) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn open(&self, uri: &str) {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(uri.to_string());
    }
}
