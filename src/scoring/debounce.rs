use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Window used for stat button presses.
pub const PRESS_WINDOW: Duration = Duration::from_millis(300);

/// Keyed leading-edge debounce.
///
/// The first call for a key fires; further calls for that key are dropped
/// until `window` has passed since the call that fired. Dropped calls do not
/// extend the window.
#[derive(Debug)]
pub struct LeadingDebounce<K> {
    window: Duration,
    fired: HashMap<K, Instant>,
}

impl<K: Eq + Hash> LeadingDebounce<K> {
    pub fn new(window: Duration) -> Self {
        LeadingDebounce {
            window,
            fired: HashMap::new(),
        }
    }

    /// Returns `true` if this call should fire.
    pub fn admit(&mut self, key: K, now: Instant) -> bool {
        // Keep the map from growing with stale keys.
        let window = self.window;
        self.fired
            .retain(|_, at| now.saturating_duration_since(*at) < window);
        if self.fired.contains_key(&key) {
            return false;
        }
        self.fired.insert(key, now);
        true
    }
}
