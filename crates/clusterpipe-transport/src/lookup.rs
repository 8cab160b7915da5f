use std::net::SocketAddr;

#[cfg(unix)]
const MAX_HOST_LEN: usize = 1025;

/// Resolve the host name of a socket address.
///
/// Falls back to the numeric form of the address when the resolver has no
/// name for it, so the result is never empty.
#[cfg(unix)]
pub fn lookup_host_name(addr: &SocketAddr) -> std::io::Result<String> {
    let raw = socket2::SockAddr::from(*addr);
    let mut host = [0u8; MAX_HOST_LEN];

    // SAFETY: `raw` holds an initialised sockaddr of `raw.len()` bytes, `host`
    // is writable for `MAX_HOST_LEN` bytes, and no service buffer is requested.
    let rc = unsafe {
        libc::getnameinfo(
            raw.as_ptr().cast::<libc::sockaddr>(),
            raw.len(),
            host.as_mut_ptr().cast::<libc::c_char>(),
            MAX_HOST_LEN as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            0,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::other(format!(
            "name lookup for {} failed (code {rc})",
            addr.ip()
        )));
    }

    let name = std::ffi::CStr::from_bytes_until_nul(&host)
        .map_err(|_| std::io::Error::other("host name is not NUL-terminated"))?;
    Ok(name.to_string_lossy().into_owned())
}

/// Resolve the host name of a socket address.
///
/// Reverse lookup is not wired up on this platform; the numeric address is
/// returned instead.
#[cfg(not(unix))]
pub fn lookup_host_name(addr: &SocketAddr) -> std::io::Result<String> {
    Ok(addr.ip().to_string())
}
