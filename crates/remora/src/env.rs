//! Environment-block assembly for launched targets.
//!
//! The platform hands a process its environment as one UTF-16 blob of
//! NUL-terminated `KEY=VALUE` entries with an extra NUL at the end. The
//! launcher reads the calling process's full blob (including hidden entries
//! such as the `=X:=...` per-drive directories, which higher-level
//! iterators skip) and appends the caller's entries after it.

#[cfg(any(windows, test))]
use std::ffi::OsString;

#[cfg(any(windows, test))]
use widestring::U16String;

#[cfg(windows)]
use crate::error::OsError;

/// Appends `extra` entries to a double-NUL-terminated environment block.
///
/// Entries are appended verbatim after the inherited ones; nothing is
/// deduplicated. When a key occurs both inherited and appended, the
/// inherited copy comes first and is the one the platform's environment
/// parser honors.
#[cfg(any(windows, test))]
pub(crate) fn merge_block(inherited: &[u16], extra: &[(OsString, OsString)]) -> Vec<u16> {
    let mut merged = Vec::with_capacity(inherited.len() + 64 * extra.len());

    for entry in inherited.split(|&unit| unit == 0) {
        if entry.is_empty() {
            continue;
        }

        merged.extend_from_slice(entry);
        merged.push(0);
    }

    for (key, value) in extra {
        merged.extend_from_slice(U16String::from_os_str(key).as_slice());
        merged.push(u16::from(b'='));
        merged.extend_from_slice(U16String::from_os_str(value).as_slice());
        merged.push(0);
    }

    merged.push(0);
    merged
}

/// Reads the calling process's full environment block.
#[cfg(windows)]
pub(crate) fn inherited_block() -> Result<Vec<u16>, OsError> {
    use windows_sys::Win32::System::Environment::{
        FreeEnvironmentStringsW, GetEnvironmentStringsW,
    };

    let strings = unsafe { GetEnvironmentStringsW() };
    if strings.is_null() {
        return Err(OsError::last("GetEnvironmentStringsW"));
    }

    // The blob ends at the first NUL that terminates an empty entry.
    let mut len = 0;
    unsafe {
        while !(*strings.add(len) == 0 && *strings.add(len + 1) == 0) {
            len += 1;
        }
    }

    let block = unsafe { std::slice::from_raw_parts(strings, len + 2) }.to_vec();
    unsafe { FreeEnvironmentStringsW(strings) };

    Ok(block)
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::merge_block;

    fn wide(text: &str) -> Vec<u16> {
        text.encode_utf16().collect()
    }

    fn entry(key: &str, value: &str) -> (OsString, OsString) {
        (OsString::from(key), OsString::from(value))
    }

    #[test]
    fn appends_after_the_inherited_block() {
        let inherited = wide("PATH=C:\\Windows\0TEMP=C:\\Tmp\0\0");
        let merged = merge_block(&inherited, &[entry("FOO", "BAR")]);

        assert_eq!(merged, wide("PATH=C:\\Windows\0TEMP=C:\\Tmp\0FOO=BAR\0\0"));
    }

    #[test]
    fn block_stays_double_nul_terminated() {
        let merged = merge_block(&wide("A=1\0\0"), &[]);
        assert_eq!(merged, wide("A=1\0\0"));

        let merged = merge_block(&wide("\0\0"), &[entry("A", "1")]);
        assert_eq!(merged, wide("A=1\0\0"));
    }

    #[test]
    fn duplicate_keys_keep_both_copies_inherited_first() {
        // Appending never replaces; the platform parser takes the first
        // occurrence, which stays the inherited one.
        let inherited = wide("FOO=inherited\0\0");
        let merged = merge_block(&inherited, &[entry("FOO", "appended")]);

        assert_eq!(merged, wide("FOO=inherited\0FOO=appended\0\0"));
    }

    #[test]
    fn hidden_drive_entries_survive_the_merge() {
        let inherited = wide("=C:=C:\\Users\\x\0PATH=C:\\Windows\0\0");
        let merged = merge_block(&inherited, &[]);

        assert_eq!(merged, wide("=C:=C:\\Users\\x\0PATH=C:\\Windows\0\0"));
    }
}
