//! Read-only view of a named shared-memory mapping.
//!
//! Only Windows has the simulators that publish these mappings; elsewhere
//! [`SharedMemoryView::open`] always reports the source as not available.

use ssp_telemetry_core::{TelemetryError, TelemetryResult};

#[cfg(windows)]
pub use windows_impl::SharedMemoryView;

#[cfg(not(windows))]
pub use fallback::SharedMemoryView;

#[cfg(windows)]
#[expect(unsafe_code, reason = "Win32 file mapping FFI")]
mod windows_impl {
    use super::{TelemetryError, TelemetryResult};
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use tracing::debug;
    use winapi::um::{
        handleapi::{CloseHandle, INVALID_HANDLE_VALUE},
        memoryapi::{FILE_MAP_READ, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile},
        winnt::HANDLE,
    };

    pub struct SharedMemoryView {
        handle: HANDLE,
        base_ptr: *const u8,
        size: usize,
        name: String,
    }

    impl std::fmt::Debug for SharedMemoryView {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SharedMemoryView")
                .field("name", &self.name)
                .field("size", &self.size)
                .finish_non_exhaustive()
        }
    }

    // SAFETY: the view is read-only and owned; the handle and pointer are only
    // released in Drop.
    unsafe impl Send for SharedMemoryView {}

    impl Drop for SharedMemoryView {
        fn drop(&mut self) {
            // SAFETY: base_ptr came from MapViewOfFile and is unmapped exactly once.
            unsafe {
                UnmapViewOfFile(self.base_ptr.cast());
            }
            // SAFETY: handle came from OpenFileMappingW and is closed exactly once.
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }

    impl SharedMemoryView {
        /// Open the first mapping in `names` that exists, mapping `size` bytes.
        pub fn open(source_id: &str, names: &[&str], size: usize) -> TelemetryResult<Self> {
            for name in names {
                let wide: Vec<u16> = OsStr::new(name)
                    .encode_wide()
                    .chain(std::iter::once(0))
                    .collect();

                // SAFETY: `wide` is a NUL-terminated UTF-16 string that outlives the call.
                let handle = unsafe { OpenFileMappingW(FILE_MAP_READ, 0, wide.as_ptr()) };
                if handle.is_null() || handle == INVALID_HANDLE_VALUE {
                    debug!(mapping = *name, "shared memory mapping not present");
                    continue;
                }

                // SAFETY: handle is a valid mapping handle opened above.
                let view = unsafe { MapViewOfFile(handle, FILE_MAP_READ, 0, 0, size) };
                if view.is_null() {
                    // SAFETY: handle is valid and not stored anywhere else.
                    unsafe {
                        CloseHandle(handle);
                    }
                    debug!(mapping = *name, "failed to map shared memory view");
                    continue;
                }

                return Ok(Self {
                    handle,
                    base_ptr: view.cast_const().cast(),
                    size,
                    name: (*name).to_string(),
                });
            }
            Err(TelemetryError::not_available(
                source_id,
                format!("shared memory {} not found", names.join(" / ")),
            ))
        }

        /// Copy of the first `len` bytes (bounded by the mapped size).
        pub fn read_prefix(&self, len: usize) -> Vec<u8> {
            let len = len.min(self.size);
            // SAFETY: base_ptr points at a live read-only view of at least `size` bytes.
            let bytes = unsafe { std::slice::from_raw_parts(self.base_ptr, len) };
            bytes.to_vec()
        }

        pub fn name(&self) -> &str {
            &self.name
        }
    }
}

#[cfg(not(windows))]
mod fallback {
    use super::{TelemetryError, TelemetryResult};

    /// Never constructed on this platform.
    #[derive(Debug)]
    pub struct SharedMemoryView {
        name: String,
    }

    impl SharedMemoryView {
        pub fn open(source_id: &str, names: &[&str], _size: usize) -> TelemetryResult<Self> {
            Err(TelemetryError::not_available(
                source_id,
                format!(
                    "shared memory {} is only available on Windows",
                    names.join(" / ")
                ),
            ))
        }

        pub fn read_prefix(&self, _len: usize) -> Vec<u8> {
            Vec::new()
        }

        pub fn name(&self) -> &str {
            &self.name
        }
    }
}
