use std::io;

/// Converts an IO error to a libc error code.
///
/// Uses the raw OS error when present, otherwise maps the error kind, and
/// falls back to `EIO`.
pub fn io_error_to_errno(e: &io::Error) -> i32 {
    if let Some(code) = e.raw_os_error() {
        return code;
    }

    match e.kind() {
        io::ErrorKind::NotFound => libc::ENOENT,
        io::ErrorKind::PermissionDenied => libc::EACCES,
        io::ErrorKind::AlreadyExists => libc::EEXIST,
        io::ErrorKind::InvalidInput => libc::EINVAL,
        _ => libc::EIO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_os_error_passthrough() {
        for code in [libc::ENOENT, libc::EACCES, libc::EBADF, libc::ENOSPC] {
            let e = io::Error::from_raw_os_error(code);
            assert_eq!(io_error_to_errno(&e), code);
        }
    }

    #[test]
    fn test_kind_mapping_without_os_error() {
        let e = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(io_error_to_errno(&e), libc::ENOENT);

        let e = io::Error::other("custom error");
        assert_eq!(io_error_to_errno(&e), libc::EIO);
    }
}
