//! Parsing of values given on the command line

use std::num::ParseIntError;

use crate::{
    error::Error,
    session::FieldValue,
    target::efuse::{EfuseField, FieldKind},
};

/// Parse a decimal or `0x` prefixed hexadecimal integer
pub(crate) fn parse_u32(input: &str) -> Result<u32, ParseIntError> {
    parse_int::parse(input)
}

/// Parse a decimal or `0x` prefixed hexadecimal integer
pub(crate) fn parse_usize(input: &str) -> Result<usize, ParseIntError> {
    parse_int::parse(input)
}

/// Parse a value for `field`.
///
/// Byte fields take a hex string, most significant byte first; MAC fields
/// take the usual colon separated notation.
pub(crate) fn parse_value(field: &EfuseField, input: &str) -> Result<FieldValue, Error> {
    let invalid = |reason: &str| Error::InvalidValue {
        name: field.name.to_owned(),
        value: input.to_owned(),
        reason: reason.to_owned(),
    };

    match field.kind {
        FieldKind::Bool => match input.to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(FieldValue::Bool(true)),
            "0" | "false" => Ok(FieldValue::Bool(false)),
            _ => Err(invalid("expected 0, 1, true or false")),
        },
        FieldKind::Uint => parse_int::parse::<u64>(input)
            .map(FieldValue::Uint)
            .map_err(|_| invalid("expected a decimal or 0x prefixed hexadecimal number")),
        FieldKind::Mac => {
            let bytes = input
                .split(':')
                .map(|byte| u8::from_str_radix(byte, 16))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid("expected a MAC address like aa:bb:cc:dd:ee:ff"))?;

            if bytes.len() != 6 {
                return Err(invalid("a MAC address has 6 bytes"));
            }

            Ok(FieldValue::Bytes(bytes.into_iter().rev().collect()))
        }
        FieldKind::Bytes => {
            let mut bytes = parse_hex(input).ok_or_else(|| invalid("expected a hex string"))?;
            bytes.reverse();
            Ok(FieldValue::Bytes(bytes))
        }
    }
}

/// Decode a hex string with optional `0x` prefix
pub(crate) fn parse_hex(input: &str) -> Option<Vec<u8>> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);

    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Format stored bytes as a MAC address
pub(crate) fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .rev()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Chip;

    fn field(chip: Chip, name: &str) -> &'static EfuseField {
        chip.efuse_layout().field(name).unwrap()
    }

    #[test]
    fn parses_integers() {
        assert_eq!(parse_u32("0x10").unwrap(), 16);
        assert_eq!(parse_u32("42").unwrap(), 42);
        assert!(parse_u32("forty-two").is_err());
        assert_eq!(parse_usize("0x20").unwrap(), 32);
    }

    #[test]
    fn parses_field_values() {
        let flag = field(Chip::Esp32c3, "DIS_PAD_JTAG");
        assert_eq!(parse_value(flag, "1").unwrap(), FieldValue::Bool(true));
        assert_eq!(parse_value(flag, "False").unwrap(), FieldValue::Bool(false));
        assert!(parse_value(flag, "2").is_err());

        let uint = field(Chip::Esp32c3, "SECURE_VERSION");
        assert_eq!(parse_value(uint, "0x1f").unwrap(), FieldValue::Uint(31));
    }

    #[test]
    fn parses_mac_addresses() {
        let mac = field(Chip::Esp32, "MAC");
        let value = parse_value(mac, "aa:bb:cc:dd:ee:01").unwrap();

        assert_eq!(
            value,
            FieldValue::Bytes(vec![0x01, 0xee, 0xdd, 0xcc, 0xbb, 0xaa])
        );
        if let FieldValue::Bytes(bytes) = value {
            assert_eq!(format_mac(&bytes), "aa:bb:cc:dd:ee:01");
        }

        assert!(parse_value(mac, "aa:bb:cc").is_err());
    }

    #[test]
    fn parses_hex_strings() {
        assert_eq!(parse_hex("0x0102ff").unwrap(), vec![0x01, 0x02, 0xff]);
        assert_eq!(parse_hex("abcd").unwrap(), vec![0xab, 0xcd]);
        assert!(parse_hex("abc").is_none());
        assert!(parse_hex("zz").is_none());
        assert!(parse_hex("").is_none());
    }
}
