//! Enumeration of the hash-prefix keyspace

use std::ops::Range;

/// Width of a range prefix in hex characters
pub const PREFIX_LEN: usize = 5;

/// Number of distinct 5-character hex prefixes (16^5)
pub const FULL_RANGE_COUNT: u32 = 1 << (4 * PREFIX_LEN as u32);

/// An ordered set of range identifiers `0..len`
///
/// Partial spaces always cover the lowest identifiers, so a `tiny` run
/// fetches `00000` through `000FF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpace {
    len: u32,
}

impl RangeSpace {
    /// The whole keyspace, 00000 to FFFFF
    pub fn full() -> Self {
        Self {
            len: FULL_RANGE_COUNT,
        }
    }

    /// The first `len` identifiers, capped at the full keyspace
    pub fn with_len(len: u32) -> Self {
        Self {
            len: len.min(FULL_RANGE_COUNT),
        }
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All identifiers in ascending order
    pub fn iter(&self) -> Range<u32> {
        0..self.len
    }

    /// Fixed-width uppercase hex prefix for a range identifier
    pub fn prefix(id: u32) -> String {
        format!("{:0width$X}", id, width = PREFIX_LEN)
    }
}

impl IntoIterator for RangeSpace {
    type Item = u32;
    type IntoIter = Range<u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Download size options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadSize {
    /// 256 ranges (00000-000FF)
    Tiny,
    /// 65,536 ranges (00000-0FFFF)
    Sample,
    /// 1,048,576 ranges
    Full,
}

impl DownloadSize {
    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Some(DownloadSize::Tiny),
            "sample" => Some(DownloadSize::Sample),
            "full" => Some(DownloadSize::Full),
            _ => None,
        }
    }

    /// Get the number of ranges for this size
    pub fn range_count(&self) -> u32 {
        match self {
            DownloadSize::Tiny => 256,
            DownloadSize::Sample => 65_536,
            DownloadSize::Full => FULL_RANGE_COUNT,
        }
    }

    pub fn range_space(&self) -> RangeSpace {
        RangeSpace::with_len(self.range_count())
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            DownloadSize::Tiny => "tiny (256 ranges)",
            DownloadSize::Sample => "sample (65,536 ranges)",
            DownloadSize::Full => "full (1,048,576 ranges)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_prefix_is_zero_padded_uppercase() {
        assert_eq!(RangeSpace::prefix(0), "00000");
        assert_eq!(RangeSpace::prefix(0xAB), "000AB");
        assert_eq!(RangeSpace::prefix(0x5BAA6), "5BAA6");
        assert_eq!(RangeSpace::prefix(FULL_RANGE_COUNT - 1), "FFFFF");
    }

    #[test]
    fn test_full_space_is_bijective() {
        let space = RangeSpace::full();
        assert_eq!(space.len(), 1_048_576);

        let prefixes: HashSet<String> = space.iter().map(RangeSpace::prefix).collect();
        assert_eq!(prefixes.len(), space.len() as usize);
        assert!(prefixes.iter().all(|p| p.len() == PREFIX_LEN));
        for id in space.iter().step_by(997) {
            let prefix = RangeSpace::prefix(id);
            assert_eq!(u32::from_str_radix(&prefix, 16).unwrap(), id);
        }
    }

    #[test]
    fn test_partial_space_covers_lowest_ids() {
        let space = DownloadSize::Tiny.range_space();
        let ids: Vec<u32> = space.into_iter().collect();
        assert_eq!(ids.len(), 256);
        assert_eq!(RangeSpace::prefix(*ids.first().unwrap()), "00000");
        assert_eq!(RangeSpace::prefix(*ids.last().unwrap()), "000FF");
    }

    #[test]
    fn test_with_len_is_capped() {
        assert_eq!(RangeSpace::with_len(u32::MAX).len(), FULL_RANGE_COUNT);
        assert!(RangeSpace::with_len(0).is_empty());
    }

    #[test]
    fn test_download_size_parse() {
        assert_eq!(DownloadSize::parse("TINY"), Some(DownloadSize::Tiny));
        assert_eq!(DownloadSize::parse("sample"), Some(DownloadSize::Sample));
        assert_eq!(DownloadSize::parse("Full"), Some(DownloadSize::Full));
        assert_eq!(DownloadSize::parse("huge"), None);
        assert_eq!(DownloadSize::Sample.range_space().len(), 65_536);
    }
}
