use anyhow::Result;
use parking_lot::Mutex;

use crate::{registry::ProcessRegistry, suppression::SuppressionTable};

pub type ProcessId = u32;

pub const WM_CLOSE: u32 = 0x0010;

/// Opaque window handle value. Only unique among windows that currently exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub isize);

/// The parts of the window manager the interceptor needs.
pub trait WindowSystem {
    fn owning_process(&self, window: WindowId) -> Option<ProcessId>;
    /// Base name of the process executable, `None` if it cannot be queried.
    fn executable_name(&self, process: ProcessId) -> Option<String>;
    fn hide(&self, window: WindowId);
    fn install_override(&self, window: WindowId) -> Result<()>;
}

pub trait HookInstaller {
    type Handle: Send;

    fn install(&self) -> Result<Self::Handle>;
    /// The handle stays installed from the interceptor's point of view
    /// unless this succeeds.
    fn uninstall(&self, handle: &Self::Handle) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Not ours, let the message continue untouched.
    Forward,
    /// Window hidden and its override armed to swallow this close.
    Intercepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideAction {
    Forward,
    Swallow,
}

struct State<H> {
    registry: ProcessRegistry,
    suppression: SuppressionTable,
    hook: Option<H>,
}

/// Process-wide close interception state.
///
/// One lock guards the registry, the suppression table and the installed hook.
/// Critical sections only touch those maps; calls into the window system
/// happen outside of it.
pub struct Interceptor<H> {
    target_executable: String,
    state: Mutex<State<H>>,
}

impl<H> Interceptor<H> {
    pub fn new(target_executable: impl Into<String>) -> Self {
        Self {
            target_executable: target_executable.into(),
            state: Mutex::new(State {
                registry: ProcessRegistry::default(),
                suppression: SuppressionTable::default(),
                hook: None,
            }),
        }
    }

    /// Installs the global hook unless it is already installed.
    pub fn activate<I>(&self, hooks: &I) -> Result<()>
    where
        I: HookInstaller<Handle = H>,
    {
        let mut state = self.state.lock();
        if state.hook.is_some() {
            tracing::debug!("interception already active");
            return Ok(());
        }

        state.hook = Some(hooks.install()?);
        tracing::info!(executable = %self.target_executable, "interception activated");
        Ok(())
    }

    /// Removes the global hook if one is installed.
    pub fn deactivate<I>(&self, hooks: &I) -> Result<()>
    where
        I: HookInstaller<Handle = H>,
    {
        let mut state = self.state.lock();
        let Some(hook) = state.hook.as_ref() else {
            return Ok(());
        };

        hooks.uninstall(hook)?;
        state.hook = None;
        tracing::info!("interception deactivated");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().hook.is_some()
    }

    pub fn is_main_window(&self, process: ProcessId, window: WindowId) -> bool {
        self.state.lock().registry.is_main_window(process, window)
    }

    pub fn main_window(&self, process: ProcessId) -> Option<WindowId> {
        self.state.lock().registry.main_window(process)
    }

    pub fn is_suppressed(&self, window: WindowId) -> bool {
        self.state.lock().suppression.is_armed(window)
    }

    pub fn has_override(&self, window: WindowId) -> bool {
        self.state.lock().suppression.has_override(window)
    }

    /// Runs for every close attempt seen by the global hook.
    pub fn observe_close<W: WindowSystem>(&self, system: &W, window: WindowId) -> CloseDisposition {
        let Some(process) = system.owning_process(window) else {
            return CloseDisposition::Forward;
        };

        match system.executable_name(process) {
            Some(name) if name.eq_ignore_ascii_case(&self.target_executable) => {}
            _ => return CloseDisposition::Forward,
        }

        if !self.is_main_window(process, window) {
            tracing::debug!(process, ?window, "secondary window closing");
            return CloseDisposition::Forward;
        }

        let install = self.state.lock().suppression.claim_override(window);
        if install {
            if let Err(err) = system.install_override(window) {
                tracing::warn!(?window, "failed to override window procedure: {err:#}");
                self.state.lock().suppression.abandon_override(window);
                return CloseDisposition::Forward;
            }
            tracing::debug!(process, ?window, "override installed on main window");
        }

        system.hide(window);
        self.state.lock().suppression.arm(window);
        tracing::debug!(process, ?window, "main window hidden instead of closed");

        CloseDisposition::Intercepted
    }

    /// Decides what the per-window override does with `message`.
    pub fn override_message(&self, window: WindowId, message: u32) -> OverrideAction {
        if message != WM_CLOSE {
            return OverrideAction::Forward;
        }

        if self.state.lock().suppression.take(window) {
            OverrideAction::Swallow
        } else {
            OverrideAction::Forward
        }
    }

    /// The override was removed from `window` (it is being destroyed).
    pub fn forget_override(&self, window: WindowId) {
        self.state.lock().suppression.release_override(window);
    }
}
