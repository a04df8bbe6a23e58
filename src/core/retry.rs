use std::io;
use std::thread;
use std::time::Duration;

const BACKOFF_STEP: Duration = Duration::from_millis(50);

/// Errors worth another attempt: the operation may succeed once the
/// other party lets go of the file.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Run `op` up to `attempts + 1` times, sleeping a little longer after each
/// transient failure. Non-transient errors are returned immediately.
pub fn with_retries<T, F>(attempts: u32, mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let mut tries = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && tries < attempts => {
                tries += 1;
                tracing::debug!("transient I/O error (attempt {}): {}", tries, err);
                thread::sleep(BACKOFF_STEP * tries);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_retries_transient_until_success() {
        let calls = Cell::new(0);
        let result = with_retries(3, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(io::Error::new(io::ErrorKind::Interrupted, "busy"))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_attempts() {
        let calls = Cell::new(0);
        let result: io::Result<()> = with_retries(2, || {
            calls.set(calls.get() + 1);
            Err(io::Error::new(io::ErrorKind::TimedOut, "locked"))
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_permanent_error_not_retried() {
        let calls = Cell::new(0);
        let result: io::Result<()> = with_retries(5, || {
            calls.set(calls.get() + 1);
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
        });

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
        assert_eq!(calls.get(), 1);
    }
}
