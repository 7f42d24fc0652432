//! Process signalling

/// Ask a process to terminate (SIGTERM)
#[cfg(unix)]
pub fn terminate(pid: u32) -> std::io::Result<()> {
    // SAFETY: kill(2) has no memory-safety preconditions
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Graceful termination is not available; the caller falls through to a forced kill
#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> std::io::Result<()> {
    Ok(())
}
