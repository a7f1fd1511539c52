//! Human-readable size parsing (e.g., "2GB", "500MB").

use std::fmt;
use thiserror::Error;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;
const TB: u64 = 1024 * GB;

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}' - expected format like '2GB', '500MB', or '1024KB'")]
pub struct SizeParseError {
    input: String,
}

impl SizeParseError {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Accepts bare byte counts and the binary suffixes `K`/`KB`, `M`/`MB`,
/// `G`/`GB` and `T`/`TB`, case-insensitive and whitespace tolerant.
///
/// # Examples
///
/// ```
/// use stowage::config::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1 KB").unwrap(), 1024);
/// assert_eq!(parse_size("200MB").unwrap(), 200 * 1024 * 1024);
/// assert_eq!(parse_size("10gb").unwrap(), 10 * 1024 * 1024 * 1024);
/// ```
pub fn parse_size(s: &str) -> Result<u64, SizeParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SizeParseError::new(s));
    }

    let upper = s.to_ascii_uppercase();
    let suffixes: [(&str, u64); 8] = [
        ("TB", TB),
        ("GB", GB),
        ("MB", MB),
        ("KB", KB),
        ("T", TB),
        ("G", GB),
        ("M", MB),
        ("K", KB),
    ];
    let (num_str, multiplier) = suffixes
        .iter()
        .find(|(suffix, _)| upper.ends_with(suffix))
        .map(|(suffix, mult)| (s[..s.len() - suffix.len()].trim(), *mult))
        .unwrap_or((s, 1));

    let num: u64 = num_str.parse().map_err(|_| SizeParseError::new(s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| SizeParseError::new(s))
}

/// Format a byte count using the largest unit that divides it exactly.
///
/// # Examples
///
/// ```
/// use stowage::config::format_size;
///
/// assert_eq!(format_size(1024), "1KB");
/// assert_eq!(format_size(200 * 1024 * 1024), "200MB");
/// assert_eq!(format_size(1000), "1000");
/// ```
pub fn format_size(bytes: u64) -> String {
    for (unit, size) in [("TB", TB), ("GB", GB), ("MB", MB), ("KB", KB)] {
        if bytes >= size && bytes % size == 0 {
            return format!("{}{}", bytes / size, unit);
        }
    }
    bytes.to_string()
}

/// Approximate, human-friendly rendering for display (e.g. "1.5 GB").
pub fn readable_size(bytes: u64) -> String {
    let (value, unit) = match bytes {
        b if b >= GB => (b as f64 / GB as f64, "GB"),
        b if b >= MB => (b as f64 / MB as f64, "MB"),
        b if b >= KB => (b as f64 / KB as f64, "KB"),
        b => return format!("{} B", b),
    };
    format!("{:.1} {}", value, unit)
}

/// A size value that can be parsed from and formatted to human-readable strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size(pub u64);

impl Size {
    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn from_mb(mb: u64) -> Self {
        Self(mb * MB)
    }

    pub fn from_gb(gb: u64) -> Self {
        Self(gb * GB)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_size(self.0))
    }
}

impl std::str::FromStr for Size {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(Size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_number() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("999999").unwrap(), 999999);
    }

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(parse_size("1k").unwrap(), KB);
        assert_eq!(parse_size("1KB").unwrap(), KB);
        assert_eq!(parse_size("500M").unwrap(), 500 * MB);
        assert_eq!(parse_size("2 GB").unwrap(), 2 * GB);
        assert_eq!(parse_size("1tb").unwrap(), TB);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("-1GB").is_err());
        assert!(parse_size("1.5GB").is_err());
        assert!(parse_size("99999999999TB").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(KB), "1KB");
        assert_eq!(format_size(200 * MB), "200MB");
        assert_eq!(format_size(10 * GB), "10GB");
        assert_eq!(format_size(1000), "1000");
    }

    #[test]
    fn test_size_roundtrip() {
        for s in ["1KB", "200MB", "2GB", "3TB"] {
            let parsed: Size = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn test_readable_size() {
        assert_eq!(readable_size(512), "512 B");
        assert_eq!(readable_size(1536), "1.5 KB");
        assert_eq!(readable_size(3 * GB), "3.0 GB");
    }
}
