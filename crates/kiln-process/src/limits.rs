//! Open-file limit
//!
//! Every running child costs the parent up to two pipe descriptors, so wide
//! builds want a soft `RLIMIT_NOFILE` well above the usual default.

use std::io;

/// Raise the soft open-file limit to at least `limit`, capped by the hard
/// limit
///
/// Never lowers an existing limit. Returns the soft limit in effect
/// afterwards.
#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
pub fn raise_open_file_limit(limit: u64) -> io::Result<u64> {
    use nix::sys::resource::{getrlimit, setrlimit, Resource};
    use tracing::debug;

    let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE)?;
    if soft as u64 >= limit {
        return Ok(soft as u64);
    }

    let target = limit.min(hard as u64);
    setrlimit(Resource::RLIMIT_NOFILE, target as _, hard)?;
    debug!(from = soft as u64, to = target, "Raised open file limit");
    Ok(target)
}

#[cfg(not(unix))]
pub fn raise_open_file_limit(_limit: u64) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "open file limit is not adjustable on this platform",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_never_lowers_limit() {
        let current = raise_open_file_limit(0).unwrap();
        assert!(current > 0);
        assert_eq!(raise_open_file_limit(1).unwrap(), current);
    }

    #[test]
    #[serial]
    #[allow(clippy::unnecessary_cast)]
    fn test_raise_is_capped_by_hard_limit() {
        use nix::sys::resource::{getrlimit, Resource};

        let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE).unwrap();
        let wanted = (soft as u64).saturating_add(16);
        let expected = wanted.min(hard as u64);

        assert_eq!(raise_open_file_limit(wanted).unwrap(), expected);
        assert_eq!(raise_open_file_limit(0).unwrap(), expected);
    }
}
