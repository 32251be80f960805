use std::{
    ffi::c_void,
    os::windows::{
        ffi::OsStringExt,
        io::{AsRawHandle, FromRawHandle, OwnedHandle},
    },
    path::PathBuf,
};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{FreeLibrary, HANDLE, HINSTANCE, HMODULE, HWND, MAX_PATH},
        System::{
            LibraryLoader::{
                GetModuleFileNameW, GetModuleHandleExW, GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS,
                GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            },
            ProcessStatus::GetModuleBaseNameW,
            Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ},
        },
        UI::WindowsAndMessaging::{
            GetWindowThreadProcessId, SetWindowsHookExW, ShowWindow, UnhookWindowsHookEx, HHOOK,
            SW_HIDE, WH_CALLWNDPROC,
        },
    },
};

use crate::{
    config::{Config, CONFIG_FILE},
    interceptor::{HookInstaller, Interceptor, ProcessId, WindowId, WindowSystem},
};

mod call_wnd_proc;
mod close_override;

/// State for this copy of the module. The global hook API only allows one
/// hook procedure per module, so the state behind it is a singleton as well.
static INTERCEPTOR: Lazy<Interceptor<InstalledHook>> =
    Lazy::new(|| Interceptor::new(load_config().target_executable));

pub fn activate() -> Result<()> {
    INTERCEPTOR.activate(&CallWndProcHook)
}

pub fn deactivate() -> Result<()> {
    INTERCEPTOR.deactivate(&CallWndProcHook)
}

impl From<HWND> for WindowId {
    fn from(hwnd: HWND) -> Self {
        WindowId(hwnd.0 as isize)
    }
}

impl From<WindowId> for HWND {
    fn from(window: WindowId) -> Self {
        HWND(window.0 as *mut c_void)
    }
}

fn load_config() -> Config {
    let config = module_path()
        .map(|path| path.with_file_name(CONFIG_FILE))
        .and_then(Config::load);

    match config {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("using default config: {err:#}");
            Config::default()
        }
    }
}

/// Handle of the module containing this code, without taking a reference.
fn own_module(flags: u32) -> Result<HMODULE> {
    let mut module = HMODULE::default();
    let address = PCWSTR(call_wnd_proc::hook_proc as *const u16);
    unsafe { GetModuleHandleExW(GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | flags, address, &mut module) }
        .context("failed to resolve own module handle")?;
    Ok(module)
}

fn module_path() -> Result<PathBuf> {
    let module = own_module(GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT)?;

    let mut buf = [0u16; 1024];
    let len = unsafe { GetModuleFileNameW(module, &mut buf) } as usize;
    if len == 0 || len == buf.len() {
        anyhow::bail!("failed to read module file name");
    }

    Ok(PathBuf::from(std::ffi::OsString::from_wide(&buf[..len])))
}

/// Extra loader reference keeping the module mapped while interception is active.
struct ModulePin(isize);

impl ModulePin {
    fn acquire() -> Result<Self> {
        let module = own_module(0)?;
        Ok(Self(module.0 as isize))
    }

    fn instance(&self) -> HINSTANCE {
        HINSTANCE(self.0 as *mut c_void)
    }
}

impl Drop for ModulePin {
    fn drop(&mut self) {
        let _ = unsafe { FreeLibrary(HMODULE(self.0 as *mut c_void)) };
    }
}

pub struct InstalledHook {
    hook: isize,
    _pin: ModulePin,
}

struct CallWndProcHook;

impl HookInstaller for CallWndProcHook {
    type Handle = InstalledHook;

    fn install(&self) -> Result<InstalledHook> {
        let pin = ModulePin::acquire()?;
        let hook = unsafe {
            SetWindowsHookExW(
                WH_CALLWNDPROC,
                Some(call_wnd_proc::hook_proc),
                pin.instance(),
                0,
            )
        }
        .context("failed to install WH_CALLWNDPROC hook")?;

        Ok(InstalledHook {
            hook: hook.0 as isize,
            _pin: pin,
        })
    }

    fn uninstall(&self, handle: &InstalledHook) -> Result<()> {
        unsafe { UnhookWindowsHookEx(HHOOK(handle.hook as *mut c_void)) }
            .context("failed to remove WH_CALLWNDPROC hook")?;
        Ok(())
    }
}

/// The live window manager.
struct Desktop;

impl WindowSystem for Desktop {
    fn owning_process(&self, window: WindowId) -> Option<ProcessId> {
        let mut process = 0;
        let thread = unsafe { GetWindowThreadProcessId(HWND::from(window), Some(&mut process)) };
        (thread != 0).then_some(process)
    }

    fn executable_name(&self, process: ProcessId) -> Option<String> {
        let handle = unsafe {
            OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, process)
        }
        .ok()?;
        let handle = unsafe { OwnedHandle::from_raw_handle(handle.0) };

        let mut name = [0u16; MAX_PATH as usize];
        let raw = HANDLE(handle.as_raw_handle());
        let len = unsafe { GetModuleBaseNameW(raw, HMODULE::default(), &mut name) } as usize;
        (len > 0).then(|| String::from_utf16_lossy(&name[..len]))
    }

    fn hide(&self, window: WindowId) {
        let _ = unsafe { ShowWindow(HWND::from(window), SW_HIDE) };
    }

    fn install_override(&self, window: WindowId) -> Result<()> {
        close_override::install(window, &INTERCEPTOR)
    }
}
