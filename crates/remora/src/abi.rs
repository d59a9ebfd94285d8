//! The parameter block and trampoline shared with the target process.
//!
//! The trampoline is a short, hand-assembled AMD64 routine executed as the
//! start routine of the remote thread. It has no symbolic knowledge of
//! [`LoaderParams`]: it reaches into the record purely through byte
//! displacements baked into its instruction stream at authoring time. The
//! layout constants below are therefore validated against the encoded
//! displacements at compile time, so the record and the code cannot drift
//! apart silently.

use std::{mem, path::Path};

use widestring::U16CString;
use zerocopy::{Immutable, IntoBytes};

use crate::error::{OsError, codes};

/// Capacity of the module-path field, in UTF-16 units (`MAX_PATH`).
pub const MODULE_PATH_CAPACITY: usize = 260;

/// Capacity of the entry-point-name field, in bytes.
pub const ENTRY_NAME_CAPACITY: usize = 256;

/// Total size of [`LoaderParams`]; the trampoline bytes are placed
/// immediately after the record in the remote region.
pub const PARAMS_SIZE: usize = 800;

const MODULE_PATH_OFFSET: usize = 0;
const ENTRY_NAME_OFFSET: usize = 520;
const LOAD_LIBRARY_OFFSET: usize = 776;
const RESOLVE_SYMBOL_OFFSET: usize = 784;
const LAST_ERROR_OFFSET: usize = 792;

/// Addresses of the loader primitives, as observed in the calling process.
///
/// The engine relies on the core system libraries being mapped at the same
/// base in every process of a session, so addresses resolved locally are
/// valid inside the target as well. That assumption is checked against the
/// target's module list before anything is written into it.
#[derive(Debug, Clone, Copy)]
pub struct LoaderPrimitives {
    /// `LoadLibraryW`, as mapped in the target.
    pub load_library: u64,

    /// `GetProcAddress`, as mapped in the target.
    pub resolve_symbol: u64,

    /// `GetLastError`, as mapped in the target.
    pub last_error: u64,
}

/// Fixed-layout record written verbatim into the target process.
///
/// Field order, sizes and offsets form a bit-exact contract with
/// [`TRAMPOLINE`]; any change here must be mirrored in the instruction
/// bytes, and the compile-time assertions below refuse a build where the
/// two disagree.
#[derive(IntoBytes, Immutable, Clone, Debug)]
#[repr(C)]
pub struct LoaderParams {
    /// UTF-16, NUL-terminated path of the module the target must load.
    module_path: [u16; MODULE_PATH_CAPACITY],

    /// NUL-terminated name of the entry point to resolve and call.
    entry_name: [u8; ENTRY_NAME_CAPACITY],

    /// `LoadLibraryW` in the target's address space.
    load_library: u64,

    /// `GetProcAddress` in the target's address space.
    resolve_symbol: u64,

    /// `GetLastError` in the target's address space.
    last_error: u64,
}

impl LoaderParams {
    /// Builds the record for loading `module` and invoking `entry` in it.
    ///
    /// Values that do not fit their fixed-size field are rejected with
    /// `ERROR_NOT_ENOUGH_MEMORY` rather than truncated; interior NUL
    /// characters are rejected with `ERROR_INVALID_PARAMETER`.
    pub fn new(
        module: &Path,
        entry: &str,
        primitives: &LoaderPrimitives,
    ) -> Result<Self, OsError> {
        let mut params = Self {
            module_path: [0; MODULE_PATH_CAPACITY],
            entry_name: [0; ENTRY_NAME_CAPACITY],
            load_library: primitives.load_library,
            resolve_symbol: primitives.resolve_symbol,
            last_error: primitives.last_error,
        };

        let path = U16CString::from_os_str(module.as_os_str())
            .map_err(|_| OsError::new("module path", codes::INVALID_PARAMETER))?;
        let path = path.as_slice_with_nul();
        if path.len() > MODULE_PATH_CAPACITY {
            return Err(OsError::new("module path", codes::NOT_ENOUGH_MEMORY));
        }
        params.module_path[..path.len()].copy_from_slice(path);

        let name = entry.as_bytes();
        if name.contains(&0) {
            return Err(OsError::new("entry name", codes::INVALID_PARAMETER));
        }
        if name.len() >= ENTRY_NAME_CAPACITY {
            return Err(OsError::new("entry name", codes::NOT_ENOUGH_MEMORY));
        }
        params.entry_name[..name.len()].copy_from_slice(name);

        Ok(params)
    }
}

/// Machine code executed as the start routine of the remote thread.
///
/// The thread parameter (`rcx`) carries the address of the [`LoaderParams`]
/// record. The code loads the requested module, resolves the entry point and
/// calls it, translating each loader failure into the target-side
/// `GetLastError` value. Whatever ends up in `eax` becomes the thread exit
/// code: `0` reports success, anything else travels back as a platform
/// error code.
///
/// ```text
/// 00  53                      push  rbx
/// 01  48 83 ec 20             sub   rsp, 0x20            ; shadow space, realigns
/// 05  48 8b d9                mov   rbx, rcx             ; rbx = params
/// 08  ff 93 08 03 00 00       call  [rbx + 0x308]        ; LoadLibraryW(params)
/// 0e  48 85 c0                test  rax, rax
/// 11  75 08                   jnz   loaded
/// 13  ff 93 18 03 00 00       call  [rbx + 0x318]        ; GetLastError()
/// 19  eb 1f                   jmp   done
/// 1b  48 8b c8                mov   rcx, rax             ; loaded:
/// 1e  48 8d 93 08 02 00 00    lea   rdx, [rbx + 0x208]   ; entry name
/// 25  ff 93 10 03 00 00       call  [rbx + 0x310]        ; GetProcAddress(mod, name)
/// 2b  48 85 c0                test  rax, rax
/// 2e  75 08                   jnz   resolved
/// 30  ff 93 18 03 00 00       call  [rbx + 0x318]        ; GetLastError()
/// 36  eb 02                   jmp   done
/// 38  ff d0                   call  rax                  ; resolved: entry()
/// 3a  48 83 c4 20             add   rsp, 0x20            ; done:
/// 3e  5b                      pop   rbx
/// 3f  c3                      ret
/// ```
///
/// All displacements are `rbx`-relative, so the code is position-independent
/// and needs no patching before the copy into the target.
#[rustfmt::skip]
pub const TRAMPOLINE: [u8; 64] = [
    0x53,                                       // push rbx
    0x48, 0x83, 0xec, 0x20,                     // sub  rsp, 0x20
    0x48, 0x8b, 0xd9,                           // mov  rbx, rcx
    0xff, 0x93, 0x08, 0x03, 0x00, 0x00,         // call [rbx + load_library]
    0x48, 0x85, 0xc0,                           // test rax, rax
    0x75, 0x08,                                 // jnz  loaded
    0xff, 0x93, 0x18, 0x03, 0x00, 0x00,         // call [rbx + last_error]
    0xeb, 0x1f,                                 // jmp  done
    0x48, 0x8b, 0xc8,                           // mov  rcx, rax
    0x48, 0x8d, 0x93, 0x08, 0x02, 0x00, 0x00,   // lea  rdx, [rbx + entry_name]
    0xff, 0x93, 0x10, 0x03, 0x00, 0x00,         // call [rbx + resolve_symbol]
    0x48, 0x85, 0xc0,                           // test rax, rax
    0x75, 0x08,                                 // jnz  resolved
    0xff, 0x93, 0x18, 0x03, 0x00, 0x00,         // call [rbx + last_error]
    0xeb, 0x02,                                 // jmp  done
    0xff, 0xd0,                                 // call rax
    0x48, 0x83, 0xc4, 0x20,                     // add  rsp, 0x20
    0x5b,                                       // pop  rbx
    0xc3,                                       // ret
];

/// Reads a little-endian displacement out of an instruction stream.
const fn disp32(code: &[u8], at: usize) -> usize {
    u32::from_le_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]]) as usize
}

// The record layout and the displacements encoded in the trampoline are two
// renditions of the same contract; refuse to build when they disagree.
const _: () = {
    assert!(mem::size_of::<LoaderParams>() == PARAMS_SIZE);
    assert!(mem::offset_of!(LoaderParams, module_path) == MODULE_PATH_OFFSET);
    assert!(mem::offset_of!(LoaderParams, entry_name) == ENTRY_NAME_OFFSET);
    assert!(mem::offset_of!(LoaderParams, load_library) == LOAD_LIBRARY_OFFSET);
    assert!(mem::offset_of!(LoaderParams, resolve_symbol) == RESOLVE_SYMBOL_OFFSET);
    assert!(mem::offset_of!(LoaderParams, last_error) == LAST_ERROR_OFFSET);

    assert!(disp32(&TRAMPOLINE, 0x0a) == LOAD_LIBRARY_OFFSET);
    assert!(disp32(&TRAMPOLINE, 0x15) == LAST_ERROR_OFFSET);
    assert!(disp32(&TRAMPOLINE, 0x21) == ENTRY_NAME_OFFSET);
    assert!(disp32(&TRAMPOLINE, 0x27) == RESOLVE_SYMBOL_OFFSET);
    assert!(disp32(&TRAMPOLINE, 0x32) == LAST_ERROR_OFFSET);
};

#[cfg(test)]
mod tests {
    use std::path::Path;

    use zerocopy::IntoBytes;

    use super::{
        ENTRY_NAME_CAPACITY, ENTRY_NAME_OFFSET, LAST_ERROR_OFFSET, LOAD_LIBRARY_OFFSET,
        LoaderParams, LoaderPrimitives, MODULE_PATH_CAPACITY, PARAMS_SIZE,
        RESOLVE_SYMBOL_OFFSET,
    };
    use crate::error::codes;

    fn primitives() -> LoaderPrimitives {
        LoaderPrimitives {
            load_library: 0x1111_2222_3333_4444,
            resolve_symbol: 0x5555_6666_7777_8888,
            last_error: 0x9999_aaaa_bbbb_cccc,
        }
    }

    #[test]
    fn fields_land_where_the_trampoline_reads_them() {
        let params =
            LoaderParams::new(Path::new("C:\\hooks\\payload.dll"), "module_init", &primitives())
                .unwrap();
        let bytes = params.as_bytes();

        assert_eq!(bytes.len(), PARAMS_SIZE);

        // Path is UTF-16 at the record start.
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), b'C' as u16);

        // Entry name is single-byte characters at its own offset.
        assert_eq!(
            &bytes[ENTRY_NAME_OFFSET..ENTRY_NAME_OFFSET + 11],
            b"module_init"
        );
        assert_eq!(bytes[ENTRY_NAME_OFFSET + 11], 0);

        // Primitive slots hold the exact addresses, little-endian.
        assert_eq!(
            &bytes[LOAD_LIBRARY_OFFSET..LOAD_LIBRARY_OFFSET + 8],
            &0x1111_2222_3333_4444u64.to_le_bytes()
        );
        assert_eq!(
            &bytes[RESOLVE_SYMBOL_OFFSET..RESOLVE_SYMBOL_OFFSET + 8],
            &0x5555_6666_7777_8888u64.to_le_bytes()
        );
        assert_eq!(
            &bytes[LAST_ERROR_OFFSET..LAST_ERROR_OFFSET + 8],
            &0x9999_aaaa_bbbb_ccccu64.to_le_bytes()
        );
    }

    #[test]
    fn path_at_capacity_minus_one_fits() {
        // 259 characters plus the terminator exactly fill the field.
        let path = format!("C:\\{}", "a".repeat(MODULE_PATH_CAPACITY - 4));
        assert_eq!(path.chars().count(), MODULE_PATH_CAPACITY - 1);

        assert!(LoaderParams::new(Path::new(&path), "init", &primitives()).is_ok());
    }

    #[test]
    fn oversized_path_is_rejected_not_truncated() {
        let path = format!("C:\\{}", "a".repeat(MODULE_PATH_CAPACITY - 3));
        assert_eq!(path.chars().count(), MODULE_PATH_CAPACITY);

        let error = LoaderParams::new(Path::new(&path), "init", &primitives()).unwrap_err();
        assert_eq!(error.code(), codes::NOT_ENOUGH_MEMORY);
    }

    #[test]
    fn entry_name_at_capacity_minus_one_fits() {
        let name = "e".repeat(ENTRY_NAME_CAPACITY - 1);
        assert!(LoaderParams::new(Path::new("C:\\p.dll"), &name, &primitives()).is_ok());
    }

    #[test]
    fn oversized_entry_name_is_rejected() {
        let name = "e".repeat(ENTRY_NAME_CAPACITY);
        let error =
            LoaderParams::new(Path::new("C:\\p.dll"), &name, &primitives()).unwrap_err();
        assert_eq!(error.code(), codes::NOT_ENOUGH_MEMORY);
    }

    #[test]
    fn interior_nul_in_entry_name_is_rejected() {
        let error =
            LoaderParams::new(Path::new("C:\\p.dll"), "in\0it", &primitives()).unwrap_err();
        assert_eq!(error.code(), codes::INVALID_PARAMETER);
    }
}
