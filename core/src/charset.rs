//! Response charset detection and decoding.
//!
//! Text and upload responses default to ISO-8859-1 when `Content-Type`
//! names no charset; JSON responses default to UTF-8.

use encoding_rs::Encoding;

use crate::error::ApiError;
use crate::http::find_header;

pub const DEFAULT_TEXT_CHARSET: &str = "ISO-8859-1";
pub const DEFAULT_JSON_CHARSET: &str = "UTF-8";

/// Read the `charset` parameter of the `Content-Type` header.
pub fn parse_charset(headers: &[(String, String)], default: &str) -> String {
    let Some(content_type) = find_header(headers, "content-type") else {
        return default.to_string();
    };
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Decode `bytes` using `charset`, resolved through the WHATWG label table.
///
/// A byte order mark overrides the label. Malformed sequences are replaced
/// rather than rejected. A label the table does not know yields
/// `ApiError::EncodingError` naming it.
pub fn decode(bytes: &[u8], charset: &str) -> Result<String, ApiError> {
    let encoding = Encoding::for_label(charset.trim().as_bytes())
        .ok_or_else(|| ApiError::EncodingError(charset.to_string()))?;
    let (text, _, _) = encoding.decode(bytes);
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(content_type: &str) -> Vec<(String, String)> {
        vec![("Content-Type".to_string(), content_type.to_string())]
    }

    #[test]
    fn charset_parameter_is_extracted() {
        assert_eq!(parse_charset(&headers("text/plain; charset=utf-8"), DEFAULT_TEXT_CHARSET), "utf-8");
        assert_eq!(parse_charset(&headers("text/plain;CHARSET=\"UTF-8\""), DEFAULT_TEXT_CHARSET), "UTF-8");
    }

    #[test]
    fn missing_charset_uses_default() {
        assert_eq!(parse_charset(&headers("text/plain"), DEFAULT_TEXT_CHARSET), DEFAULT_TEXT_CHARSET);
        assert_eq!(parse_charset(&[], DEFAULT_JSON_CHARSET), DEFAULT_JSON_CHARSET);
        assert_eq!(parse_charset(&headers("text/plain; charset="), DEFAULT_JSON_CHARSET), DEFAULT_JSON_CHARSET);
    }

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        assert_eq!(decode(&[0x63, 0x61, 0x66, 0xe9], "ISO-8859-1").unwrap(), "café");
    }

    #[test]
    fn utf8_is_lossy() {
        assert_eq!(decode("café".as_bytes(), "utf-8").unwrap(), "café");
        assert_eq!(decode(&[0x61, 0xff], "UTF-8").unwrap(), "a\u{fffd}");
    }

    #[test]
    fn windows_1252_decodes_its_own_range() {
        assert_eq!(decode(&[0x80, 0x20, 0x93, 0x61, 0x94], "windows-1252").unwrap(), "\u{20ac} \u{201c}a\u{201d}");
        assert_eq!(decode(&[0x80], "cp1252").unwrap(), "\u{20ac}");
    }

    #[test]
    fn iso_8859_15_has_the_euro_sign() {
        assert_eq!(decode(&[0xa4], "ISO-8859-15").unwrap(), "\u{20ac}");
    }

    #[test]
    fn utf16_honours_byte_order() {
        assert_eq!(decode(&[0xff, 0xfe, b'o', 0, b'k', 0], "UTF-16").unwrap(), "ok");
        assert_eq!(decode(&[0, b'o', 0, b'k'], "utf-16be").unwrap(), "ok");
        assert_eq!(decode(&[b'o', 0, b'k', 0], "utf-16le").unwrap(), "ok");
    }

    #[test]
    fn ascii_label_is_a_superset_alias() {
        assert_eq!(decode(b"plain", "us-ascii").unwrap(), "plain");
    }

    #[test]
    fn unknown_charset_is_an_encoding_error() {
        let err = decode(b"hello", "x-klingon").unwrap_err();
        assert!(matches!(err, ApiError::EncodingError(ref name) if name == "x-klingon"));
    }
}
