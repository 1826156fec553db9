//! Raw resource metadata reported by the library.
//!
//! The library does not promise a representation for these values: a file
//! size may arrive as a signed or unsigned integer, a float, or text. Each
//! field has an ordered list of decoders; the first one that succeeds wins
//! and a value nobody understands is treated as unknown.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    FileSize,
    OriginalFilename,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Text(String),
}

type Decoder = fn(&ResourceValue) -> Option<u64>;

const FILE_SIZE_DECODERS: &[Decoder] = &[
    decode_unsigned,
    decode_signed,
    decode_whole_float,
    decode_numeric_text,
];

fn decode_unsigned(value: &ResourceValue) -> Option<u64> {
    match value {
        ResourceValue::Unsigned(n) => Some(*n),
        _ => None,
    }
}

fn decode_signed(value: &ResourceValue) -> Option<u64> {
    match value {
        ResourceValue::Signed(n) => u64::try_from(*n).ok(),
        _ => None,
    }
}

fn decode_whole_float(value: &ResourceValue) -> Option<u64> {
    match value {
        ResourceValue::Float(f) if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 => {
            Some(*f as u64)
        }
        _ => None,
    }
}

fn decode_numeric_text(value: &ResourceValue) -> Option<u64> {
    match value {
        ResourceValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// File size in bytes, or `None` when it cannot be determined.
pub fn decode_file_size(value: Option<&ResourceValue>) -> Option<u64> {
    let value = value?;
    FILE_SIZE_DECODERS.iter().find_map(|decode| decode(value))
}

/// Human-readable byte count ("1.5 MB").
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_known_representations() {
        assert_eq!(decode_file_size(Some(&ResourceValue::Unsigned(10))), Some(10));
        assert_eq!(decode_file_size(Some(&ResourceValue::Signed(2048))), Some(2048));
        assert_eq!(decode_file_size(Some(&ResourceValue::Float(512.0))), Some(512));
        assert_eq!(decode_file_size(Some(&ResourceValue::Text(" 77 ".into()))), Some(77));
    }

    #[test]
    fn test_unknown_representations_fall_back() {
        assert_eq!(decode_file_size(None), None);
        assert_eq!(decode_file_size(Some(&ResourceValue::Signed(-1))), None);
        assert_eq!(decode_file_size(Some(&ResourceValue::Float(1.5))), None);
        assert_eq!(decode_file_size(Some(&ResourceValue::Float(f64::NAN))), None);
        assert_eq!(decode_file_size(Some(&ResourceValue::Text("big".into()))), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
