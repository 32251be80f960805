use std::{
    ffi::CStr,
    mem,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use hide_on_close_hook::{ACTIVATE_EXPORT, DEACTIVATE_EXPORT};
use windows::{
    core::{HRESULT, HSTRING, PCSTR},
    Win32::{
        Foundation::{FreeLibrary, HMODULE},
        System::LibraryLoader::{GetProcAddress, LoadLibraryW},
    },
};

type Export = unsafe extern "system" fn() -> HRESULT;

/// The interception module loaded into the supervisor itself.
///
/// The global hook is installed from here; Windows maps the same DLL into
/// the processes the hook reaches.
pub struct LocalModule {
    handle: HMODULE,
    path: PathBuf,
}

impl LocalModule {
    pub fn load(path: &Path) -> Result<Self> {
        let handle = unsafe { LoadLibraryW(&HSTRING::from(path.as_os_str())) }
            .with_context(|| format!("failed to load {}", path.display()))?;

        Ok(Self {
            handle,
            path: path.to_path_buf(),
        })
    }

    pub fn activate(&self) -> Result<()> {
        self.call(ACTIVATE_EXPORT)
    }

    pub fn deactivate(&self) -> Result<()> {
        self.call(DEACTIVATE_EXPORT)
    }

    fn call(&self, export: &CStr) -> Result<()> {
        let name = export.to_string_lossy();
        let function = unsafe { GetProcAddress(self.handle, PCSTR(export.as_ptr().cast())) }
            .with_context(|| format!("{} does not export {name}", self.path.display()))?;

        let function = unsafe { mem::transmute::<unsafe extern "system" fn() -> isize, Export>(function) };
        unsafe { function() }.ok().with_context(|| format!("{name} failed"))
    }
}

impl Drop for LocalModule {
    fn drop(&mut self) {
        let _ = unsafe { FreeLibrary(self.handle) };
    }
}
