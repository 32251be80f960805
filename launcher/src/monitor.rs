use std::ffi::OsStr;

use hide_on_close_hook::config::Config;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// Lists running target processes by executable base name.
///
/// Processes are only enumerated here, never opened, so a target that
/// refuses access still shows up and the injector reports why.
#[derive(Default)]
pub struct Scanner {
    system: System,
}

impl Scanner {
    pub fn scan(&mut self, config: &Config) -> Vec<u32> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        let processes = self.system.processes().iter();
        matching_pids(processes.map(|(pid, process)| (pid.as_u32(), process.name())), config)
    }
}

/// Pids whose executable name is exactly the configured target, ascending.
fn matching_pids<'a>(
    processes: impl IntoIterator<Item = (u32, &'a OsStr)>,
    config: &Config,
) -> Vec<u32> {
    let mut pids: Vec<u32> = processes
        .into_iter()
        .filter(|(pid, name)| *pid != 0 && name.to_str().is_some_and(|name| config.is_target(name)))
        .map(|(pid, _)| pid)
        .collect();
    pids.sort_unstable();
    pids
}

/// Decides when a target process needs the module injected.
///
/// Each process id is injected once while it keeps being observed. Once the
/// target disappears the tracker forgets it, so a restart is picked up even
/// if the OS hands out the same id again.
#[derive(Debug, Default)]
pub struct Tracker {
    current: Option<u32>,
}

impl Tracker {
    /// Records the latest scan and returns the pid to inject, if any.
    ///
    /// The tracked process is kept while it is still running; otherwise the
    /// lowest running pid is picked.
    pub fn observe(&mut self, running: &[u32]) -> Option<u32> {
        let kept = self.current.filter(|pid| running.contains(pid));
        if kept.is_some() {
            return None;
        }

        self.current = running.iter().copied().filter(|&pid| pid != 0).min();
        self.current
    }
}

#[cfg(windows)]
pub use supervisor::run;

#[cfg(windows)]
mod supervisor {
    use std::thread;

    use anyhow::{Error, Result};
    use hide_on_close_hook::injector;

    use super::{Scanner, Tracker};
    use crate::{config::Settings, module::LocalModule, winapi};

    struct Supervisor<'a> {
        settings: &'a Settings,
        scanner: Scanner,
        tracker: Tracker,
        module: Option<LocalModule>,
    }

    impl<'a> Supervisor<'a> {
        fn new(settings: &'a Settings) -> Self {
            Self {
                settings,
                scanner: Scanner::default(),
                tracker: Tracker::default(),
                module: None,
            }
        }

        fn poll(&mut self) {
            let running = self.scanner.scan(&self.settings.config);
            if let Some(pid) = self.tracker.observe(&running) {
                tracing::info!(pid, "target process found");
                self.attach(pid);
            }
        }

        fn attach(&mut self, pid: u32) {
            if let Err(err) = injector::inject(pid, &self.settings.module) {
                if err.is_access_denied() && !unsafe { winapi::is_admin() }.unwrap_or(false) {
                    tracing::warn!("target refused access; try running the supervisor elevated");
                }
                report("Failed to inject into the target process", err.into());
                return;
            }
            tracing::info!(pid, module = %self.settings.module.display(), "module injected");

            if let Err(err) = self.activate() {
                report("Failed to activate interception", err);
            }
        }

        fn activate(&mut self) -> Result<()> {
            let module = match self.module.take() {
                Some(module) => module,
                None => LocalModule::load(&self.settings.module)?,
            };
            self.module.insert(module).activate()
        }

        fn shutdown(self) {
            if let Some(module) = self.module {
                if let Err(err) = module.deactivate() {
                    tracing::warn!("{err:#}");
                }
            }
        }
    }

    fn report(message: &str, err: Error) {
        tracing::error!("{message}: {err:#}");
        winapi::notify_error(&format!("{message}.\n\n{err:#}"));
    }

    pub fn run(settings: &Settings) -> Result<()> {
        let Some(_instance) = winapi::SingleInstance::acquire()? else {
            winapi::notify_error("Hide On Close is already running.");
            return Ok(());
        };
        winapi::install_console_handler()?;

        if !unsafe { winapi::is_admin() }.unwrap_or(false) {
            tracing::debug!("running without elevation");
        }
        tracing::info!(
            executable = %settings.config.target_executable,
            module = %settings.module.display(),
            "watching for target process"
        );

        let mut supervisor = Supervisor::new(settings);
        while winapi::running() {
            supervisor.poll();
            thread::sleep(settings.config.poll_interval());
        }

        tracing::info!("shutting down");
        supervisor.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;

    fn config(target: &str) -> Config {
        Config {
            target_executable: target.to_owned(),
            ..Config::default()
        }
    }

    fn processes(list: &[(u32, &str)]) -> Vec<(u32, OsString)> {
        list.iter().map(|&(pid, name)| (pid, OsString::from(name))).collect()
    }

    fn matches(list: &[(u32, &str)], target: &str) -> Vec<u32> {
        let list = processes(list);
        matching_pids(list.iter().map(|(pid, name)| (*pid, name.as_os_str())), &config(target))
    }

    #[test]
    fn scan_matches_whole_name_ignoring_case() {
        let running = [
            (40, "xolk.exe"),
            (30, "OLK.EXE"),
            (20, "olk.exe.bak"),
            (10, "olk.exe"),
            (50, "explorer.exe"),
        ];

        assert_eq!(matches(&running, "olk.exe"), vec![10, 30]);
    }

    #[test]
    fn scan_ignores_idle_process() {
        assert_eq!(matches(&[(0, "olk.exe")], "olk.exe"), Vec::<u32>::new());
    }

    #[test]
    fn new_pid_is_injected_once() {
        let mut tracker = Tracker::default();

        assert_eq!(tracker.observe(&[]), None);
        assert_eq!(tracker.observe(&[100]), Some(100));
        assert_eq!(tracker.observe(&[100]), None);
        assert_eq!(tracker.observe(&[100]), None);
    }

    #[test]
    fn restart_with_new_pid_is_injected() {
        let mut tracker = Tracker::default();

        tracker.observe(&[100]);
        assert_eq!(tracker.observe(&[200]), Some(200));
        assert_eq!(tracker.observe(&[200]), None);
    }

    #[test]
    fn restart_with_reused_pid_is_injected() {
        let mut tracker = Tracker::default();

        tracker.observe(&[100]);
        assert_eq!(tracker.observe(&[]), None);
        assert_eq!(tracker.observe(&[100]), Some(100));
    }

    #[test]
    fn tracked_pid_is_kept_while_running() {
        let mut tracker = Tracker::default();

        assert_eq!(tracker.observe(&[300]), Some(300));
        assert_eq!(tracker.observe(&[100, 300]), None);
        assert_eq!(tracker.observe(&[100]), Some(100));
    }

    #[test]
    fn zero_pid_means_not_running() {
        let mut tracker = Tracker::default();

        tracker.observe(&[100]);
        assert_eq!(tracker.observe(&[0]), None);
        assert_eq!(tracker.observe(&[100]), Some(100));
    }
}
