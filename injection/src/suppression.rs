use std::collections::HashMap;

use crate::interceptor::WindowId;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct WindowState {
    suppress_next_close: bool,
    override_installed: bool,
}

/// Per-window close suppression flags.
///
/// A window only gets an entry once a close attempt on it has been
/// intercepted. The suppression flag is one-shot: `take` clears it.
#[derive(Debug, Default)]
pub struct SuppressionTable {
    windows: HashMap<WindowId, WindowState>,
}

impl SuppressionTable {
    /// Marks the override as installed, returning `true` if the caller is the
    /// one that has to install it.
    pub fn claim_override(&mut self, window: WindowId) -> bool {
        let state = self.windows.entry(window).or_default();
        !std::mem::replace(&mut state.override_installed, true)
    }

    pub fn release_override(&mut self, window: WindowId) {
        if let Some(state) = self.windows.get_mut(&window) {
            state.override_installed = false;
        }
    }

    /// Rolls back a claim whose install failed. The entry goes away unless
    /// the window was already intercepted before.
    pub fn abandon_override(&mut self, window: WindowId) {
        self.release_override(window);
        if self.windows.get(&window) == Some(&WindowState::default()) {
            self.windows.remove(&window);
        }
    }

    pub fn arm(&mut self, window: WindowId) {
        self.windows.entry(window).or_default().suppress_next_close = true;
    }

    /// Consumes the suppression flag, returning whether it was set.
    pub fn take(&mut self, window: WindowId) -> bool {
        self.windows
            .get_mut(&window)
            .map(|state| std::mem::take(&mut state.suppress_next_close))
            .unwrap_or(false)
    }

    pub fn is_armed(&self, window: WindowId) -> bool {
        self.windows
            .get(&window)
            .is_some_and(|state| state.suppress_next_close)
    }

    pub fn has_override(&self, window: WindowId) -> bool {
        self.windows
            .get(&window)
            .is_some_and(|state| state.override_installed)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppression_is_one_shot() {
        let mut table = SuppressionTable::default();
        let window = WindowId(42);

        table.arm(window);
        assert!(table.is_armed(window));
        assert!(table.take(window));
        assert!(!table.is_armed(window));
        assert!(!table.take(window));
    }

    #[test]
    fn take_on_unknown_window_creates_nothing() {
        let mut table = SuppressionTable::default();
        assert!(!table.take(WindowId(1)));
        assert!(table.is_empty());
    }

    #[test]
    fn override_is_claimed_once() {
        let mut table = SuppressionTable::default();
        let window = WindowId(9);

        assert!(table.claim_override(window));
        assert!(!table.claim_override(window));
        assert!(table.has_override(window));

        table.release_override(window);
        assert!(!table.has_override(window));
        assert!(table.claim_override(window));
    }

    #[test]
    fn abandoned_claim_leaves_no_entry() {
        let mut table = SuppressionTable::default();
        let window = WindowId(5);

        assert!(table.claim_override(window));
        table.abandon_override(window);

        assert!(!table.has_override(window));
        assert!(table.is_empty());
    }

    #[test]
    fn abandoned_claim_keeps_armed_window() {
        let mut table = SuppressionTable::default();
        let window = WindowId(6);

        table.arm(window);
        table.claim_override(window);
        table.abandon_override(window);

        assert!(table.is_armed(window));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn releasing_override_keeps_flag() {
        let mut table = SuppressionTable::default();
        let window = WindowId(3);

        table.claim_override(window);
        table.arm(window);
        table.release_override(window);

        assert!(table.is_armed(window));
        assert_eq!(table.len(), 1);
    }
}
