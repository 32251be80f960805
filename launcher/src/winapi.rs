use std::{
    ffi::c_void,
    mem,
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use windows::{
    core::{w, HSTRING},
    Win32::{
        Foundation::{CloseHandle, GetLastError, BOOL, ERROR_ALREADY_EXISTS, HANDLE, HWND},
        Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY},
        System::{
            Console::SetConsoleCtrlHandler,
            Threading::{CreateMutexW, GetCurrentProcess, OpenProcessToken, ReleaseMutex},
        },
        UI::WindowsAndMessaging::{MessageBoxW, MB_ICONERROR, MB_OK},
    },
};
use winreg::{enums::HKEY_CURRENT_USER, RegKey};

const RUN_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";
const RUN_VALUE: &str = "HideOnClose";
const INSTANCE_MUTEX: &str = "HideOnCloseSupervisor";

static RUNNING: AtomicBool = AtomicBool::new(true);

pub unsafe fn is_admin() -> Result<bool> {
    let mut token_handle = HANDLE::default();

    OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token_handle)?;

    let mut length = 0;
    let mut token_elevation = TOKEN_ELEVATION::default();

    let result = GetTokenInformation(
        token_handle,
        TokenElevation,
        Some(&mut token_elevation as *mut _ as *mut c_void),
        mem::size_of::<TOKEN_ELEVATION>() as u32,
        &mut length,
    );
    let _ = CloseHandle(token_handle);
    result?;

    Ok(token_elevation.TokenIsElevated != 0)
}

/// Value stored under the `Run` key: the quoted supervisor executable.
pub fn run_command(exe: &Path) -> String {
    format!(r#""{}""#, exe.display())
}

/// Adds or removes `HKEY_CURRENT_USER\Software\Microsoft\Windows\CurrentVersion\Run\HideOnClose`.
pub fn set_autostart(enabled: bool) -> Result<()> {
    let root = RegKey::predef(HKEY_CURRENT_USER);
    let (key, _disp) = root.create_subkey(RUN_KEY)?;

    if enabled {
        let exe_path = std::env::current_exe()?;
        key.set_value(RUN_VALUE, &run_command(&exe_path))
            .context("failed to write autostart entry")?;
    } else {
        match key.delete_value(RUN_VALUE) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                return Err(err).context("failed to remove autostart entry")
            }
            _ => {}
        }
    }

    Ok(())
}

pub fn autostart_enabled() -> Result<bool> {
    let root = RegKey::predef(HKEY_CURRENT_USER);
    let key = match root.open_subkey(RUN_KEY) {
        Ok(key) => key,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };

    Ok(key.get_raw_value(RUN_VALUE).is_ok())
}

/// Held for the life of the supervisor so only one runs per session.
pub struct SingleInstance(HANDLE);

impl SingleInstance {
    /// `None` when another supervisor already holds the mutex.
    pub fn acquire() -> Result<Option<Self>> {
        let handle = unsafe { CreateMutexW(None, true, &HSTRING::from(INSTANCE_MUTEX)) }
            .context("failed to create instance mutex")?;

        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            let _ = unsafe { CloseHandle(handle) };
            return Ok(None);
        }

        Ok(Some(Self(handle)))
    }
}

impl Drop for SingleInstance {
    fn drop(&mut self) {
        unsafe {
            let _ = ReleaseMutex(self.0);
            let _ = CloseHandle(self.0);
        }
    }
}

/// Blocking error dialog for the operator.
pub fn notify_error(message: &str) {
    unsafe {
        MessageBoxW(
            HWND::default(),
            &HSTRING::from(message),
            w!("Hide On Close"),
            MB_OK | MB_ICONERROR,
        )
    };
}

unsafe extern "system" fn console_handler(_ctrl_type: u32) -> BOOL {
    RUNNING.store(false, Ordering::SeqCst);
    BOOL(1)
}

pub fn install_console_handler() -> Result<()> {
    unsafe { SetConsoleCtrlHandler(Some(console_handler), true) }
        .context("failed to install console handler")
}

pub fn running() -> bool {
    RUNNING.load(Ordering::SeqCst)
}
