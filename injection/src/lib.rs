//! Keeps the target application's process alive when its main window is
//! closed, by hiding the window instead.
//!
//! Built as a DLL, this crate is the interception module: a `WH_CALLWNDPROC`
//! hook that watches close attempts and subclasses the first window of each
//! target process to swallow them. Built as an rlib it also provides the
//! remote [`injector`] and the shared [`config`] to the supervisor.

use std::ffi::CStr;

pub mod config;
pub mod injector;
pub mod interceptor;
pub mod registry;
pub mod suppression;

#[cfg(windows)]
mod hooks;
#[cfg(windows)]
mod logging;

pub const ACTIVATE_EXPORT: &CStr = c"ActivateInterception";
pub const DEACTIVATE_EXPORT: &CStr = c"DeactivateInterception";

#[cfg(windows)]
pub use exports::*;

#[cfg(windows)]
#[allow(non_snake_case)]
mod exports {
    use std::{
        ffi::c_void,
        panic::{self, AssertUnwindSafe},
    };

    use anyhow::Result;
    use windows::{
        core::HRESULT,
        Win32::{
            Foundation::{BOOL, E_FAIL, HINSTANCE, HMODULE, S_OK},
            System::{LibraryLoader::DisableThreadLibraryCalls, SystemServices::DLL_PROCESS_ATTACH},
        },
    };

    use crate::{hooks, logging};

    #[no_mangle]
    unsafe extern "system" fn DllMain(module: HINSTANCE, reason: u32, _reserved: *mut c_void) -> BOOL {
        if reason == DLL_PROCESS_ATTACH {
            let _ = DisableThreadLibraryCalls(HMODULE(module.0));
            logging::init();
            tracing::debug!("module loaded into {}", logging::process_name());
        }

        BOOL(1)
    }

    /// Installs the global close interceptor. Calling it again while active
    /// does nothing.
    #[no_mangle]
    pub extern "system" fn ActivateInterception() -> HRESULT {
        logging::init();
        to_hresult("activate interception", hooks::activate)
    }

    /// Removes the global close interceptor if it is installed.
    #[no_mangle]
    pub extern "system" fn DeactivateInterception() -> HRESULT {
        logging::init();
        to_hresult("deactivate interception", hooks::deactivate)
    }

    fn to_hresult(action: &str, f: fn() -> Result<()>) -> HRESULT {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => S_OK,
            Ok(Err(err)) => {
                tracing::error!("failed to {action}: {err:#}");
                err.downcast_ref::<windows::core::Error>()
                    .map_or(E_FAIL, |err| err.code())
            }
            Err(_) => E_FAIL,
        }
    }
}
