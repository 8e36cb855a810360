//! SmartSDR firmware / API version numbers.
//!
//! The radio announces its protocol version in the `V` handshake line and
//! reports the full firmware version in reply to the `version` command.
//! Several wire formats changed at firmware 2.3, so the negotiated version
//! decides which layouts the decoders use.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A four-part `major.minor.patch.build` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl FirmwareVersion {
    pub const fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// Whether this version is `major.minor` or later.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}

impl FromStr for FirmwareVersion {
    type Err = Error;

    /// Accepts `1.4.0.0`, `v3.5.1.12` and shorter forms such as `3.5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.trim().trim_start_matches(['v', 'V']);
        let mut parts = [0u32; 4];
        let mut count = 0;
        for piece in body.split('.') {
            if count == parts.len() {
                return Err(Error::Protocol(format!("invalid version format: {s}")));
            }
            parts[count] = piece
                .parse()
                .map_err(|_| Error::Protocol(format!("invalid version number: {piece}")))?;
            count += 1;
        }
        if count < 2 {
            return Err(Error::Protocol(format!("invalid version format: {s}")));
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_handshake_form() {
        let v: FirmwareVersion = "1.4.0.0".parse().unwrap();
        assert_eq!(v, FirmwareVersion::new(1, 4, 0, 0));
    }

    #[test]
    fn parse_with_prefix_and_short_form() {
        let v: FirmwareVersion = "v3.5.1.12".parse().unwrap();
        assert_eq!(v, FirmwareVersion::new(3, 5, 1, 12));
        let v: FirmwareVersion = "2.3".parse().unwrap();
        assert_eq!(v, FirmwareVersion::new(2, 3, 0, 0));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("abc".parse::<FirmwareVersion>().is_err());
        assert!("1".parse::<FirmwareVersion>().is_err());
        assert!("1.2.3.4.5".parse::<FirmwareVersion>().is_err());
    }

    #[test]
    fn at_least_compares_major_minor() {
        let v = FirmwareVersion::new(2, 3, 0, 0);
        assert!(v.at_least(2, 3));
        assert!(v.at_least(1, 9));
        assert!(!v.at_least(2, 4));
        assert!(!FirmwareVersion::new(2, 2, 99, 0).at_least(2, 3));
    }

    #[test]
    fn ordering_and_display() {
        assert!(FirmwareVersion::new(3, 0, 0, 0) > FirmwareVersion::new(2, 9, 9, 9));
        assert_eq!(FirmwareVersion::new(3, 5, 1, 12).to_string(), "3.5.1.12");
    }
}
