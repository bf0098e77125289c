//! Assertions with readable failure messages for filesystem tests.

/// Assert that two byte slices are equal.
///
/// On failure, shows sizes and the first differing position rather than
/// dumping both buffers.
pub fn assert_bytes_equal(actual: &[u8], expected: &[u8], context: &str) {
    assert!(
        actual.len() == expected.len(),
        "{context}: size mismatch - expected {} bytes, got {} bytes",
        expected.len(),
        actual.len()
    );

    if let Some((i, (a, e))) = actual
        .iter()
        .zip(expected.iter())
        .enumerate()
        .find(|(_, (a, e))| a != e)
    {
        panic!("{context}: content mismatch at byte {i} - expected 0x{e:02x}, got 0x{a:02x}");
    }
}

/// Assert that `result` failed with `expected_errno`.
pub fn assert_errno<T: std::fmt::Debug>(result: Result<T, i32>, expected_errno: i32, context: &str) {
    match result {
        Ok(value) => panic!(
            "{context}: expected errno {expected_errno} ({}) but got success with {value:?}",
            errno_name(expected_errno)
        ),
        Err(actual) => assert!(
            actual == expected_errno,
            "{context}: expected errno {expected_errno} ({}), got errno {actual} ({})",
            errno_name(expected_errno),
            errno_name(actual)
        ),
    }
}

/// Name for the errno values the mail filesystem returns.
pub fn errno_name(errno: i32) -> &'static str {
    match errno {
        libc::ENOENT => "ENOENT",
        libc::EBADF => "EBADF",
        libc::EIO => "EIO",
        libc::EACCES => "EACCES",
        libc::EROFS => "EROFS",
        libc::ETIMEDOUT => "ETIMEDOUT",
        libc::ENOBUFS => "ENOBUFS",
        libc::ENOTDIR => "ENOTDIR",
        libc::EISDIR => "EISDIR",
        libc::ECANCELED => "ECANCELED",
        _ => "UNKNOWN",
    }
}
