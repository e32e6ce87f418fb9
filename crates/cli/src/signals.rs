//! Signal handling: SIGINT and SIGTERM trip the run's cancel token.
//!
//! Handlers must be async-signal-safe, so the handler body is a pair of
//! atomic loads and one atomic store: look up the installed token, trip
//! it. No allocation, no locking, no I/O.

use std::sync::OnceLock;

use snapsend_core::CancelToken;

static INSTALLED: OnceLock<CancelToken> = OnceLock::new();

/// Installs SIGINT/SIGTERM handlers that cancel the given token.
///
/// Installation is one-shot; a second call is ignored.
pub fn install(token: CancelToken) {
    if INSTALLED.set(token).is_err() {
        return;
    }
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }
}

extern "C" fn handle_signal(_signal: libc::c_int) {
    if let Some(token) = INSTALLED.get() {
        token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::install;
    use snapsend_core::CancelToken;

    #[test]
    fn raising_sigint_trips_the_installed_token() {
        let token = CancelToken::new();
        install(token.clone());
        assert!(!token.is_cancelled());

        unsafe {
            libc::raise(libc::SIGINT);
        }
        assert!(token.is_cancelled());
    }
}
