use std::panic::{self, AssertUnwindSafe};

use windows::Win32::{
    Foundation::{LPARAM, LRESULT, WPARAM},
    UI::WindowsAndMessaging::{CallNextHookEx, CWPSTRUCT, HHOOK},
};

use crate::interceptor::{CloseDisposition, WindowId, WM_CLOSE};

use super::{Desktop, INTERCEPTOR};

/// `WH_CALLWNDPROC` procedure. Runs on whichever thread a message is being
/// sent to, in every process the hook reaches.
pub unsafe extern "system" fn hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 && lparam.0 != 0 {
        let message = &*(lparam.0 as *const CWPSTRUCT);

        if message.message == WM_CLOSE {
            let window = WindowId::from(message.hwnd);
            let disposition =
                panic::catch_unwind(AssertUnwindSafe(|| INTERCEPTOR.observe_close(&Desktop, window)))
                    .unwrap_or(CloseDisposition::Forward);

            if disposition == CloseDisposition::Intercepted {
                return LRESULT(0);
            }
        }
    }

    CallNextHookEx(HHOOK::default(), code, wparam, lparam)
}
