use std::panic::{self, AssertUnwindSafe};

use anyhow::{bail, Result};
use windows::Win32::{
    Foundation::{HWND, LPARAM, LRESULT, WPARAM},
    UI::{
        Shell::{DefSubclassProc, RemoveWindowSubclass, SetWindowSubclass},
        WindowsAndMessaging::WM_NCDESTROY,
    },
};

use crate::interceptor::{Interceptor, OverrideAction, WindowId, WM_CLOSE};

use super::InstalledHook;

const SUBCLASS_ID: usize = 0x4843_4C53;

/// Subclasses `window` so its close messages go through `interceptor`.
/// Must run on the thread that owns the window.
pub fn install(window: WindowId, interceptor: &'static Interceptor<InstalledHook>) -> Result<()> {
    let installed = unsafe {
        SetWindowSubclass(
            HWND::from(window),
            Some(subclass_proc),
            SUBCLASS_ID,
            interceptor as *const Interceptor<InstalledHook> as usize,
        )
    };

    if !installed.as_bool() {
        bail!("SetWindowSubclass refused window {window:?}");
    }
    Ok(())
}

unsafe extern "system" fn subclass_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
    _id: usize,
    ref_data: usize,
) -> LRESULT {
    let interceptor = &*(ref_data as *const Interceptor<InstalledHook>);

    match msg {
        WM_CLOSE => {
            let action = panic::catch_unwind(AssertUnwindSafe(|| {
                interceptor.override_message(WindowId::from(hwnd), msg)
            }))
            .unwrap_or(OverrideAction::Forward);

            if action == OverrideAction::Swallow {
                return LRESULT(0);
            }
        }
        WM_NCDESTROY => {
            let _ = RemoveWindowSubclass(hwnd, Some(subclass_proc), SUBCLASS_ID);
            interceptor.forget_override(WindowId::from(hwnd));
        }
        _ => {}
    }

    DefSubclassProc(hwnd, msg, wparam, lparam)
}
