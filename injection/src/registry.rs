use std::collections::HashMap;

use crate::interceptor::{ProcessId, WindowId};

/// Which window counts as the main window of each target process instance.
///
/// Entries are never replaced: the first window of a process to be seen
/// closing owns the slot for as long as that process id maps here.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    main_windows: HashMap<ProcessId, WindowId>,
}

impl ProcessRegistry {
    /// Claims `process` for `window` if unclaimed, then reports whether
    /// `window` is the claimed one.
    pub fn is_main_window(&mut self, process: ProcessId, window: WindowId) -> bool {
        *self.main_windows.entry(process).or_insert(window) == window
    }

    pub fn main_window(&self, process: ProcessId) -> Option<WindowId> {
        self.main_windows.get(&process).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_window_wins() {
        let mut registry = ProcessRegistry::default();

        assert!(registry.is_main_window(100, WindowId(1)));
        assert!(!registry.is_main_window(100, WindowId(2)));
        assert!(!registry.is_main_window(100, WindowId(3)));
        assert!(registry.is_main_window(100, WindowId(1)));
        assert_eq!(registry.main_window(100), Some(WindowId(1)));
    }

    #[test]
    fn later_order_does_not_matter() {
        let mut registry = ProcessRegistry::default();
        registry.is_main_window(7, WindowId(10));

        assert!(!registry.is_main_window(7, WindowId(30)));
        assert!(!registry.is_main_window(7, WindowId(20)));
        assert_eq!(registry.main_window(7), Some(WindowId(10)));
    }

    #[test]
    fn processes_are_independent() {
        let mut registry = ProcessRegistry::default();

        assert!(registry.is_main_window(1, WindowId(5)));
        assert!(registry.is_main_window(2, WindowId(6)));
        assert_eq!(registry.main_window(1), Some(WindowId(5)));
        assert_eq!(registry.main_window(2), Some(WindowId(6)));
        assert_eq!(registry.main_window(3), None);
    }
}
