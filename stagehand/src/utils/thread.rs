use crate::runtime::runtime::ThreadNameFn;

/// Size of the buffer pthread accepts for a thread name, null terminator
/// included.
const MAX_PTHREAD_NAME_LEN: usize = 16;

/// Names the calling thread with the next name `thread_name_fn` produces.
///
/// `std::thread::Builder` can only name threads it spawns. A local runtime
/// runs on the thread that built it, so we go through
/// `pthread_setname_np`, which takes at most 15 bytes of name. Longer names
/// are cut at 15 bytes, possibly in the middle of a multi-byte character.
///
/// Errors from pthread are ignored.
#[cfg(target_os = "linux")]
pub(crate) fn set_current_thread_name(thread_name_fn: &ThreadNameFn) {
    let name = thread_name_fn.0();
    let bytes = name.as_bytes();

    // Zero-initialized, so the name stays null terminated after the copy.
    let mut c_name_buf: [libc::c_char; MAX_PTHREAD_NAME_LEN] = [0; MAX_PTHREAD_NAME_LEN];
    for (dst, src) in c_name_buf
        .iter_mut()
        .zip(bytes.iter().take(MAX_PTHREAD_NAME_LEN - 1))
    {
        *dst = *src as libc::c_char;
    }

    unsafe {
        libc::pthread_setname_np(libc::pthread_self(), c_name_buf.as_ptr());
    }
}

/// Thread names are only set on Linux.
#[cfg(not(target_os = "linux"))]
pub(crate) fn set_current_thread_name(_thread_name_fn: &ThreadNameFn) {}
