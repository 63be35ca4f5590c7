//! Conversion between IPv4 host/CIDR notation and inclusive numeric bounds.
//!
//! Decisions store their target as `[start_ip, end_ip]` integers so range
//! containment becomes two integer comparisons.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IpRangeError {
    #[error("'{0}' is not a valid IPv4 address")]
    InvalidAddress(String),

    #[error("'{0}' has an invalid prefix length")]
    InvalidPrefix(String),

    #[error("'{0}' is an IPv6 address, only IPv4 ranges are supported")]
    UnsupportedFamily(String),

    #[error("range start {start} is greater than range end {end}")]
    Inverted { start: i64, end: i64 },
}

/// An inclusive `[start, end]` range of IPv4 addresses in numeric form.
///
/// # Examples
///
/// ```
/// use vigil_common::iprange::IpRange;
///
/// let range = IpRange::parse("192.168.1.0/24").unwrap();
/// assert_eq!(range.start, 3_232_235_776);
/// assert_eq!(range.end, 3_232_236_031);
/// assert_eq!(IpRange::parse("10.0.0.5").unwrap(), IpRange::parse("10.0.0.5/32").unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    pub start: i64,
    pub end: i64,
}

impl IpRange {
    /// Builds a range from numeric bounds, rejecting `start > end`.
    pub fn new(start: i64, end: i64) -> Result<Self, IpRangeError> {
        if start > end {
            return Err(IpRangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parses an IPv4 host (treated as a /32) or an IPv4 CIDR block.
    pub fn parse(text: &str) -> Result<Self, IpRangeError> {
        let text = text.trim();
        match text.split_once('/') {
            Some((addr, prefix)) => {
                let addr = parse_v4(addr, text)?;
                let prefix: u32 = prefix
                    .parse()
                    .ok()
                    .filter(|p| *p <= 32)
                    .ok_or_else(|| IpRangeError::InvalidPrefix(text.to_string()))?;
                Ok(Self::from_prefix(addr, prefix))
            }
            None => Self::host(text),
        }
    }

    /// Parses a bare IPv4 host address into a single-address range.
    pub fn host(text: &str) -> Result<Self, IpRangeError> {
        let text = text.trim();
        let addr = parse_v4(text, text)?;
        Ok(Self::from_prefix(addr, 32))
    }

    fn from_prefix(addr: Ipv4Addr, prefix: u32) -> Self {
        let mask: u32 = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        let start = u32::from(addr) & mask;
        let end = start | !mask;
        Self {
            start: i64::from(start),
            end: i64::from(end),
        }
    }

    /// Ranges rooted at `0.0.0.0` are treated as matching every address.
    pub fn is_unbounded(&self) -> bool {
        self.start == 0 || self.end == 0
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = Ipv4Addr::from(self.start as u32);
        let end = Ipv4Addr::from(self.end as u32);
        if self.start == self.end {
            write!(f, "{start}")
        } else {
            write!(f, "{start}-{end}")
        }
    }
}

fn parse_v4(addr: &str, input: &str) -> Result<Ipv4Addr, IpRangeError> {
    if addr.contains(':') {
        return Err(IpRangeError::UnsupportedFamily(input.to_string()));
    }
    addr.parse()
        .map_err(|_| IpRangeError::InvalidAddress(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_single_address_range() {
        let range = IpRange::parse("10.0.0.5").unwrap();
        assert_eq!(range.start, range.end);
        assert_eq!(range.start, 167_772_165);
        assert_eq!(range, IpRange::host("10.0.0.5").unwrap());
    }

    #[test]
    fn cidr_is_masked_to_network_bounds() {
        let range = IpRange::parse("10.0.0.77/24").unwrap();
        assert_eq!(range.start, 167_772_160);
        assert_eq!(range.end, 167_772_415);
        assert_eq!(range.to_string(), "10.0.0.0-10.0.0.255");

        let all = IpRange::parse("0.0.0.0/0").unwrap();
        assert_eq!(all.start, 0);
        assert_eq!(all.end, i64::from(u32::MAX));
        assert!(all.is_unbounded());
    }

    #[test]
    fn numeric_bounds_must_be_ordered() {
        assert_eq!(IpRange::new(5, 5).unwrap().to_string(), "0.0.0.5");
        assert_eq!(IpRange::new(9, 3), Err(IpRangeError::Inverted { start: 9, end: 3 }));
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(matches!(IpRange::parse("not-an-ip"), Err(IpRangeError::InvalidAddress(_))));
        assert!(matches!(IpRange::parse("10.0.0.1/33"), Err(IpRangeError::InvalidPrefix(_))));
        assert!(matches!(IpRange::parse("10.0.0.1/x"), Err(IpRangeError::InvalidPrefix(_))));
        assert!(matches!(IpRange::parse("::1"), Err(IpRangeError::UnsupportedFamily(_))));
        assert!(matches!(IpRange::host("10.0.0.0/24"), Err(IpRangeError::InvalidAddress(_))));
    }
}
