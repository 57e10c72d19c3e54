/// Hand freed heap pages back to the OS after a session ends, so a
/// long-lived VPN service does not sit on its peak footprint.
pub fn reclaim() {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        // SAFETY: malloc_trim only walks allocator-internal free lists.
        let released = unsafe { libc::malloc_trim(0) };
        tracing::debug!(released = released != 0, "malloc_trim");
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    tracing::debug!("heap trim not available on this target");
}
