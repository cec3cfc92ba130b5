//! Human-readable file sizes for the Size column.

const UNITS: &[u8; 6] = b"KMGTPE";

/// Formats `size` as one-decimal binary units, like `1.0K` or `4.5M`.
///
/// Sizes below 100 bytes are bumped by 99 first so tiny files show as `0.1K`
/// rather than `0.0K`. The decimal is truncated, not rounded.
pub fn format_size(size: i64) -> String {
    let mut size = size.max(0);
    if 0 < size && size < 100 {
        size += 99;
    }

    let mut unit = 0;
    let mut remain = size & 1023;
    size >>= 10;
    while size >= 1024 {
        remain = size & 1023;
        size >>= 10;
        unit += 1;
    }

    let mut remain = (remain / 100).min(9);
    if size > 999 {
        size = 0;
        remain = 9;
        unit += 1;
    }

    format!("{}.{}{}", size, remain, char::from(UNITS[unit]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_sizes_round_up() {
        assert_eq!(format_size(0), "0.0K");
        assert_eq!(format_size(1), "0.1K");
        assert_eq!(format_size(99), "0.1K");
        assert_eq!(format_size(100), "0.1K");
        assert_eq!(format_size(999), "0.9K");
    }

    #[test]
    fn test_unit_boundaries() {
        assert_eq!(format_size(1023), "0.9K");
        assert_eq!(format_size(1024), "1.0K");
        assert_eq!(format_size(1024 * 1024 - 1), "0.9M");
        assert_eq!(format_size(1024 * 1024), "1.0M");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0G");
    }

    #[test]
    fn test_decimal_is_truncated() {
        // 1.5K
        assert_eq!(format_size(1536), "1.5K");
        // 999K still fits, 1000K rolls over to the next unit
        assert_eq!(format_size(999 * 1024 * 1024), "999.0M");
        assert_eq!(format_size(1000 * 1024 * 1024), "0.9G");
    }

    #[test]
    fn test_largest_sizes() {
        assert_eq!(format_size(i64::MAX), "7.9E");
    }
}
