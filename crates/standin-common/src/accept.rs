use std::io;
use std::time::Duration;

/// Pause before the next `accept` after a failed one
///
/// Errors tied to a single aborted connection retry at once; anything else
/// (descriptor exhaustion and the like) backs off so the loop does not spin.
pub fn accept_retry_delay(error: &io::Error) -> Duration {
    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => Duration::ZERO,
        _ => Duration::from_millis(50),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_retry_immediately() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
        ] {
            assert_eq!(accept_retry_delay(&io::Error::from(kind)), Duration::ZERO);
        }
    }

    #[test]
    fn test_resource_errors_back_off() {
        // EMFILE surfaces as an uncategorized OS error
        let exhausted = io::Error::other("too many open files");
        assert!(accept_retry_delay(&exhausted) > Duration::ZERO);
    }
}
