//! Key/value splitting and value coercion for SmartSDR status text.
//!
//! Status payloads are runs of `key=value` tokens separated by a single
//! delimiter (a space for most objects, `#` for GPS and meters, `,` for the
//! `info` reply). Lists inside a value use `^`. Nothing here fails: a
//! malformed line simply yields fewer or emptier entries.

/// How [`parse_key_values_with`] splits and folds a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyValueOptions {
    /// Separator between tokens.
    pub delimiter: char,
    /// Lowercase keys (default `true`).
    pub lowercase_keys: bool,
    /// Lowercase values (default `false`).
    pub lowercase_values: bool,
}

impl Default for KeyValueOptions {
    fn default() -> Self {
        Self {
            delimiter: ' ',
            lowercase_keys: true,
            lowercase_values: false,
        }
    }
}

impl KeyValueOptions {
    /// Default folding with a different token separator.
    pub fn delimited(delimiter: char) -> Self {
        Self {
            delimiter,
            ..Self::default()
        }
    }
}

/// Split a space-delimited line into ordered `(key, value)` pairs, with
/// keys lowercased.
pub fn parse_key_values(line: &str) -> Vec<(String, String)> {
    parse_key_values_with(line, &KeyValueOptions::default())
}

/// Split `line` into ordered `(key, value)` pairs.
///
/// Each token splits once on `=`. A token without `=` becomes
/// `(token, "")`, trimmed, so leading words such as an object identifier
/// survive as bare keys. Empty tokens are dropped.
pub fn parse_key_values_with(line: &str, options: &KeyValueOptions) -> Vec<(String, String)> {
    line.split(options.delimiter)
        .filter_map(|token| {
            let (key, value) = match token.split_once('=') {
                Some((k, v)) => (k.trim(), v),
                None => (token.trim(), ""),
            };
            if key.is_empty() {
                return None;
            }
            let key = if options.lowercase_keys {
                key.to_lowercase()
            } else {
                key.to_string()
            };
            let value = if options.lowercase_values {
                value.to_lowercase()
            } else {
                value.to_string()
            };
            Some((key, value))
        })
        .collect()
}

/// Split a list value such as `a^b^c^` into its entries.
///
/// The trailing empty element left by a terminating delimiter is dropped;
/// interior empty elements are kept.
pub fn parse_list(value: &str, delimiter: char) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    let mut entries: Vec<String> = value.split(delimiter).map(str::to_string).collect();
    if entries.last().is_some_and(|last| last.is_empty()) {
        entries.pop();
    }
    entries
}

/// Value coercions used by the property parsers.
///
/// Every coercion returns `None` for input it cannot convert except
/// [`bool`](coerce::bool), which never fails.
pub mod coerce {
    use std::str::FromStr;

    /// Only the literal `"1"` is true.
    pub fn bool(value: &str) -> bool {
        value == "1"
    }

    pub fn int<T: FromStr>(value: &str) -> Option<T> {
        value.trim().parse().ok()
    }

    pub fn float(value: &str) -> Option<f64> {
        value.trim().parse().ok()
    }

    /// A decimal MHz string as whole hertz (multiplied, then truncated).
    pub fn mhz_to_hz(value: &str) -> Option<u64> {
        let mhz = float(value)?;
        if !mhz.is_finite() || mhz < 0.0 {
            return None;
        }
        Some((mhz * 1_000_000.0) as u64)
    }

    /// A hex identifier, with or without a `0x` prefix.
    pub fn hex_u32(value: &str) -> Option<u32> {
        let digits = value
            .trim()
            .strip_prefix("0x")
            .or_else(|| value.trim().strip_prefix("0X"))
            .unwrap_or(value.trim());
        if digits.is_empty() {
            return None;
        }
        u32::from_str_radix(digits, 16).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn splits_pairs_in_order() {
        let kv = parse_key_values("in_use=1 daxiq=2 ip=192.168.1.50");
        assert_eq!(
            kv,
            pairs(&[("in_use", "1"), ("daxiq", "2"), ("ip", "192.168.1.50")])
        );
    }

    #[test]
    fn bare_token_becomes_key_with_empty_value() {
        let kv = parse_key_values("0x00000001 in_use=0");
        assert_eq!(kv, pairs(&[("0x00000001", ""), ("in_use", "0")]));
    }

    #[test]
    fn keys_lowercased_values_preserved() {
        let kv = parse_key_values("RF_frequency=14.100000 mode=USB");
        assert_eq!(
            kv,
            pairs(&[("rf_frequency", "14.100000"), ("mode", "USB")])
        );
    }

    #[test]
    fn folding_is_configurable() {
        let options = KeyValueOptions {
            delimiter: ' ',
            lowercase_keys: false,
            lowercase_values: true,
        };
        let kv = parse_key_values_with("Mode=USB", &options);
        assert_eq!(kv, pairs(&[("Mode", "usb")]));
    }

    #[test]
    fn value_splits_only_on_first_equals() {
        let kv = parse_key_values("name=a=b");
        assert_eq!(kv, pairs(&[("name", "a=b")]));
    }

    #[test]
    fn alternate_delimiter() {
        let kv = parse_key_values_with(
            "lat=41.5#lon=-71.2#status=Fine Lock#",
            &KeyValueOptions::delimited('#'),
        );
        assert_eq!(
            kv,
            pairs(&[("lat", "41.5"), ("lon", "-71.2"), ("status", "Fine Lock")])
        );
    }

    #[test]
    fn malformed_input_yields_fewer_entries() {
        assert!(parse_key_values("").is_empty());
        assert!(parse_key_values("   ").is_empty());
        assert_eq!(parse_key_values("a=1  b=2 "), pairs(&[("a", "1"), ("b", "2")]));
        assert!(parse_key_values("=orphan").is_empty());
    }

    #[test]
    fn list_drops_trailing_empty() {
        assert_eq!(parse_list("Default^Contest^", '^'), vec!["Default", "Contest"]);
        assert_eq!(parse_list("a^^b", '^'), vec!["a", "", "b"]);
        assert!(parse_list("", '^').is_empty());
        assert_eq!(parse_list("^", '^'), vec![""]);
    }

    #[test]
    fn bool_only_one_is_true() {
        assert!(coerce::bool("1"));
        for value in ["0", "false", "yes", "", "true", "01"] {
            assert!(!coerce::bool(value), "{value:?} must be false");
        }
    }

    #[test]
    fn mhz_to_hz_truncates() {
        assert_eq!(coerce::mhz_to_hz("14.250000"), Some(14_250_000));
        assert_eq!(coerce::mhz_to_hz("14.1"), Some(14_100_000));
        assert_eq!(coerce::mhz_to_hz("0.0000009"), Some(0));
        assert_eq!(coerce::mhz_to_hz("abc"), None);
        assert_eq!(coerce::mhz_to_hz("-1.0"), None);
    }

    #[test]
    fn hex_with_and_without_prefix() {
        assert_eq!(coerce::hex_u32("0x40000000"), Some(0x4000_0000));
        assert_eq!(coerce::hex_u32("40000000"), Some(0x4000_0000));
        assert_eq!(coerce::hex_u32("0X1A2B3C4D"), Some(0x1A2B_3C4D));
        assert_eq!(coerce::hex_u32("0x"), None);
        assert_eq!(coerce::hex_u32("0xZZ"), None);
    }

    proptest! {
        #[test]
        fn built_lines_parse_back(
            entries in proptest::collection::vec(("[a-z_]{1,12}", "[A-Za-z0-9.^]{0,12}"), 0..8)
        ) {
            let line = entries
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            let parsed = parse_key_values(&line);
            prop_assert_eq!(parsed.len(), entries.len());
            for ((k, v), (pk, pv)) in entries.iter().zip(parsed.iter()) {
                prop_assert_eq!(k, pk);
                prop_assert_eq!(v, pv);
            }
        }

        #[test]
        fn parsing_never_panics(line in ".{0,64}") {
            let _ = parse_key_values(&line);
            let _ = parse_list(&line, '^');
        }
    }
}
