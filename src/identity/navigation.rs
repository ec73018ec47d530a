use parking_lot::Mutex;

/// Receives forced navigations, e.g. the jump back to the login entry point after the
/// backend rejects the credential. The front-end decides what "navigating" means.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Remembers where the application was last sent. Used by the terminal front-end and tests.
#[derive(Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self { Self::default() }

    pub fn current(&self) -> Option<String> { self.history.lock().last().cloned() }

    pub fn history(&self) -> Vec<String> { self.history.lock().clone() }

    pub fn count(&self, route: &str) -> usize { self.history.lock().iter().filter(|r| r.as_str() == route).count() }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) { self.history.lock().push(route.to_string()); }
}

/// Navigator for headless use: forced navigations are dropped.
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _route: &str) {}
}
