//! Loads the interception module into another process.
//!
//! The module path is copied into the target, then a thread is started there
//! on `LoadLibraryW` with the copied path as its argument. Every resource
//! acquired along the way is released on drop, whichever step fails.

use std::{
    ffi::OsStr,
    io, iter,
    path::{Path, PathBuf},
};

use thiserror::Error;

const ERROR_ACCESS_DENIED: i32 = 5;

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("module path must be absolute: {}", .0.display())]
    RelativeModulePath(PathBuf),
    #[error("module not found: {}", .0.display())]
    MissingModule(PathBuf),
    #[error("failed to open target process {pid}")]
    OpenProcess {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to allocate memory in target process")]
    AllocateMemory(#[source] io::Error),
    #[error("failed to write module path into target process")]
    WriteMemory(#[source] io::Error),
    #[error("failed to resolve LoadLibraryW")]
    ResolveLoader(#[source] io::Error),
    #[error("failed to create remote thread")]
    CreateRemoteThread(#[source] io::Error),
    #[error("failed to wait for remote thread")]
    Wait(#[source] io::Error),
}

impl InjectError {
    pub fn is_access_denied(&self) -> bool {
        match self {
            Self::OpenProcess { source, .. } => source.raw_os_error() == Some(ERROR_ACCESS_DENIED),
            _ => false,
        }
    }
}

/// Null terminated UTF-16 module path, as `LoadLibraryW` expects it.
pub fn encode_module_path(path: &Path) -> Result<Vec<u16>, InjectError> {
    if !path.is_absolute() {
        return Err(InjectError::RelativeModulePath(path.to_path_buf()));
    }

    Ok(wide(path.as_os_str()))
}

#[cfg(windows)]
fn wide(value: &OsStr) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    value.encode_wide().chain(iter::once(0)).collect()
}

#[cfg(not(windows))]
fn wide(value: &OsStr) -> Vec<u16> {
    value
        .to_string_lossy()
        .encode_utf16()
        .chain(iter::once(0))
        .collect()
}

#[cfg(windows)]
pub use imp::inject;

#[cfg(windows)]
mod imp {
    use std::{
        ffi::c_void,
        mem,
        os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle},
        path::Path,
    };

    use windows::{
        core::{s, w},
        Win32::{
            Foundation::{HANDLE, WAIT_FAILED},
            System::{
                Diagnostics::Debug::WriteProcessMemory,
                LibraryLoader::{GetModuleHandleW, GetProcAddress},
                Memory::{VirtualAllocEx, VirtualFreeEx, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE},
                Threading::{
                    CreateRemoteThread, GetExitCodeThread, OpenProcess, WaitForSingleObject, INFINITE,
                    PROCESS_CREATE_THREAD, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION,
                    PROCESS_VM_READ, PROCESS_VM_WRITE,
                },
            },
        },
    };

    use super::{encode_module_path, InjectError};

    type ThreadStart = unsafe extern "system" fn(*mut c_void) -> u32;

    /// Loads `module` into process `pid` and waits for the load to finish.
    pub fn inject(pid: u32, module: &Path) -> Result<(), InjectError> {
        let path = encode_module_path(module)?;
        if !module.is_file() {
            return Err(InjectError::MissingModule(module.to_path_buf()));
        }

        let access = PROCESS_CREATE_THREAD
            | PROCESS_QUERY_INFORMATION
            | PROCESS_VM_OPERATION
            | PROCESS_VM_WRITE
            | PROCESS_VM_READ;
        let process = unsafe { OpenProcess(access, false, pid) }
            .map(|handle| unsafe { OwnedHandle::from_raw_handle(handle.0) })
            .map_err(|err| InjectError::OpenProcess {
                pid,
                source: err.into(),
            })?;

        let buffer = RemoteBuffer::allocate(&process, mem::size_of_val(path.as_slice()))?;
        buffer.write(&path)?;

        let load_library = loader()?;
        let thread = unsafe {
            CreateRemoteThread(
                raw(&process),
                None,
                0,
                Some(load_library),
                Some(buffer.address.cast_const()),
                0,
                None,
            )
        }
        .map(|handle| unsafe { OwnedHandle::from_raw_handle(handle.0) })
        .map_err(|err| InjectError::CreateRemoteThread(err.into()))?;

        if unsafe { WaitForSingleObject(raw(&thread), INFINITE) } == WAIT_FAILED {
            return Err(InjectError::Wait(std::io::Error::last_os_error()));
        }

        // Low 32 bits of the HMODULE returned by LoadLibraryW in the target.
        let mut exit_code = 0;
        unsafe { GetExitCodeThread(raw(&thread), &mut exit_code) }
            .map_err(|err| InjectError::Wait(err.into()))?;
        tracing::debug!(pid, exit_code, module = %module.display(), "remote load finished");

        Ok(())
    }

    fn raw(handle: &OwnedHandle) -> HANDLE {
        HANDLE(handle.as_raw_handle())
    }

    fn loader() -> Result<ThreadStart, InjectError> {
        let kernel32 = unsafe { GetModuleHandleW(w!("kernel32.dll")) }
            .map_err(|err| InjectError::ResolveLoader(err.into()))?;
        let load_library = unsafe { GetProcAddress(kernel32, s!("LoadLibraryW")) }
            .ok_or_else(|| InjectError::ResolveLoader(std::io::Error::last_os_error()))?;

        // kernel32 is mapped at the same base in every process of the session.
        Ok(unsafe { mem::transmute::<unsafe extern "system" fn() -> isize, ThreadStart>(load_library) })
    }

    struct RemoteBuffer<'a> {
        process: &'a OwnedHandle,
        address: *mut c_void,
    }

    impl<'a> RemoteBuffer<'a> {
        fn allocate(process: &'a OwnedHandle, size: usize) -> Result<Self, InjectError> {
            let address = unsafe {
                VirtualAllocEx(
                    raw(process),
                    None,
                    size,
                    MEM_COMMIT | MEM_RESERVE,
                    PAGE_READWRITE,
                )
            };
            if address.is_null() {
                return Err(InjectError::AllocateMemory(std::io::Error::last_os_error()));
            }

            Ok(Self { process, address })
        }

        fn write(&self, data: &[u16]) -> Result<(), InjectError> {
            unsafe {
                WriteProcessMemory(
                    raw(self.process),
                    self.address,
                    data.as_ptr().cast(),
                    mem::size_of_val(data),
                    None,
                )
            }
            .map_err(|err| InjectError::WriteMemory(err.into()))
        }
    }

    impl Drop for RemoteBuffer<'_> {
        fn drop(&mut self) {
            let _ = unsafe { VirtualFreeEx(raw(self.process), self.address, 0, MEM_RELEASE) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_is_rejected() {
        let err = encode_module_path(Path::new("hide_on_close_hook.dll")).unwrap_err();
        assert!(matches!(err, InjectError::RelativeModulePath(_)));
    }

    #[test]
    fn path_is_null_terminated_utf16() {
        let path = std::env::temp_dir().join("hook.dll");
        let encoded = encode_module_path(&path).unwrap();

        assert_eq!(encoded.last(), Some(&0));
        assert_eq!(
            String::from_utf16(&encoded[..encoded.len() - 1]).unwrap(),
            path.to_string_lossy()
        );
    }

    #[test]
    fn only_open_failures_can_be_access_denied() {
        let denied = InjectError::OpenProcess {
            pid: 4,
            source: io::Error::from_raw_os_error(ERROR_ACCESS_DENIED),
        };
        assert!(denied.is_access_denied());
        assert!(
            !InjectError::AllocateMemory(io::Error::from_raw_os_error(ERROR_ACCESS_DENIED))
                .is_access_denied()
        );
    }

    #[cfg(windows)]
    #[test]
    fn unopenable_process_is_reported() {
        let module = std::env::current_exe().unwrap();
        let err = inject(0, &module).unwrap_err();
        assert!(matches!(err, InjectError::OpenProcess { pid: 0, .. }));
    }

    #[cfg(windows)]
    #[test]
    fn missing_module_is_reported_before_opening() {
        let module = std::env::temp_dir().join("does-not-exist-hook.dll");
        let err = inject(std::process::id(), &module).unwrap_err();
        assert!(matches!(err, InjectError::MissingModule(_)));
    }
}
