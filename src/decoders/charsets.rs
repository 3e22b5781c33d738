/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use crate::codecs::Encoding;

/// Charset conversion backend. The core never opens conversion state
/// eagerly; every call is self-contained.
pub trait CharsetProvider {
    /// Decodes `bytes` from `charset` into UTF-8, or `None` when the
    /// charset is unknown to this backend.
    fn decode(&self, charset: &str, bytes: &[u8]) -> Option<String>;

    /// Encodes UTF-8 `text` into `charset`.
    fn encode(&self, charset: &str, text: &str) -> Option<Vec<u8>>;
}

/// Built-in backend: UTF-8, US-ASCII and ISO-8859-1 are handled
/// internally; everything else goes through encoding_rs when the
/// `full_encoding` feature is enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCharsets;

impl CharsetProvider for DefaultCharsets {
    fn decode(&self, charset: &str, bytes: &[u8]) -> Option<String> {
        match canonical_charset(charset) {
            "utf-8" | "us-ascii" => Some(decode_utf8_lossy(bytes)),
            "iso-8859-1" => Some(bytes.iter().map(|&ch| ch as char).collect()),
            canonical => {
                #[cfg(feature = "full_encoding")]
                {
                    let encoding = encoding_rs::Encoding::for_label(canonical.as_bytes())?;
                    let (text, _, _) = encoding.decode(bytes);
                    Some(text.into_owned())
                }
                #[cfg(not(feature = "full_encoding"))]
                {
                    let _ = canonical;
                    None
                }
            }
        }
    }

    fn encode(&self, charset: &str, text: &str) -> Option<Vec<u8>> {
        match canonical_charset(charset) {
            "utf-8" => Some(text.as_bytes().to_vec()),
            "us-ascii" if text.is_ascii() => Some(text.as_bytes().to_vec()),
            "iso-8859-1" => text
                .chars()
                .map(|ch| u8::try_from(ch as u32).ok())
                .collect(),
            canonical => {
                #[cfg(feature = "full_encoding")]
                {
                    let encoding = encoding_rs::Encoding::for_label(canonical.as_bytes())?;
                    let (bytes, _, unmappable) = encoding.encode(text);
                    if unmappable {
                        None
                    } else {
                        Some(bytes.into_owned())
                    }
                }
                #[cfg(not(feature = "full_encoding"))]
                {
                    let _ = canonical;
                    None
                }
            }
        }
    }
}

pub fn decode_utf8_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Maps a charset label to its canonical name. Unrecognized labels come
/// back trimmed and lowercased for the backend to resolve.
pub fn canonical_charset(label: &str) -> &str {
    let label = label.trim();
    for (canonical, aliases) in CHARSET_ALIASES {
        if label.eq_ignore_ascii_case(canonical)
            || aliases.iter().any(|alias| label.eq_ignore_ascii_case(alias))
        {
            return canonical;
        }
    }
    label
}

static CHARSET_ALIASES: &[(&str, &[&str])] = &[
    ("utf-8", &["utf8", "unicode-1-1-utf-8"]),
    (
        "us-ascii",
        &["ascii", "ansi_x3.4-1968", "iso-ir-6", "csascii", "646"],
    ),
    (
        "iso-8859-1",
        &["latin1", "latin-1", "iso8859-1", "iso_8859-1", "cp819", "l1"],
    ),
    ("iso-8859-2", &["latin2", "iso8859-2", "l2"]),
    ("iso-8859-15", &["latin9", "iso8859-15", "l9"]),
    ("windows-1250", &["cp1250"]),
    ("windows-1251", &["cp1251"]),
    ("windows-1252", &["cp1252", "ansi"]),
    ("windows-1253", &["cp1253"]),
    ("windows-1254", &["cp1254"]),
    ("windows-1255", &["cp1255"]),
    ("windows-1256", &["cp1256"]),
    ("windows-1257", &["cp1257"]),
    ("windows-1258", &["cp1258"]),
    ("koi8-r", &["koi8r"]),
    ("koi8-u", &["koi8u"]),
    ("gbk", &["gb2312", "csgb2312"]),
    ("big5", &["big-5", "csbig5"]),
    ("euc-jp", &["eucjp"]),
    ("euc-kr", &["euckr", "ks_c_5601-1987"]),
    ("shift_jis", &["shift-jis", "sjis", "ms_kanji"]),
    ("iso-2022-jp", &["csiso2022jp"]),
];

/// True when any byte has the high bit set.
pub fn is_8bit(bytes: &[u8]) -> bool {
    bytes.iter().any(|&ch| ch > 127)
}

/// Chooses the denser transfer encoding for `bytes`: quoted-printable
/// while no more than 17% of the bytes are non-ASCII, base64 otherwise.
pub fn best_encoding(bytes: &[u8]) -> Encoding {
    let count = bytes.iter().filter(|&&ch| ch > 127).count();
    if count as f32 <= bytes.len() as f32 * 0.17 {
        Encoding::QuotedPrintable
    } else {
        Encoding::Base64
    }
}

/// Length of the longest line, for 7bit/8bit line-limit checks.
pub fn longest_line(bytes: &[u8]) -> usize {
    bytes
        .split(|&ch| ch == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line).len())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use crate::codecs::Encoding;

    use super::{best_encoding, canonical_charset, is_8bit, longest_line, CharsetProvider, DefaultCharsets};

    #[test]
    fn charset_aliases() {
        for (label, expected) in [
            ("UTF8", "utf-8"),
            (" utf-8 ", "utf-8"),
            ("Latin1", "iso-8859-1"),
            ("ISO_8859-1", "iso-8859-1"),
            ("ansi_x3.4-1968", "us-ascii"),
            ("CP1252", "windows-1252"),
            ("ks_c_5601-1987", "euc-kr"),
            ("x-unknown", "x-unknown"),
        ] {
            assert_eq!(canonical_charset(label), expected, "failed for {label:?}");
        }
    }

    #[test]
    fn decode_known_charsets() {
        let charsets = DefaultCharsets;
        assert_eq!(
            charsets.decode("iso-8859-1", b"Keld J\xf8rn Simonsen").unwrap(),
            "Keld Jørn Simonsen"
        );
        assert_eq!(charsets.decode("utf-8", "中文".as_bytes()).unwrap(), "中文");
        #[cfg(feature = "full_encoding")]
        assert_eq!(
            charsets.decode("iso-8859-6", b"\xe5\xd1\xcd\xc8\xc7").unwrap(),
            "مرحبا"
        );
    }

    #[test]
    fn encoding_heuristic() {
        assert!(!is_8bit(b"plain ascii"));
        assert!(is_8bit("café".as_bytes()));
        assert_eq!(best_encoding(b"mostly ascii \xc3\xa9"), Encoding::QuotedPrintable);
        assert_eq!(
            best_encoding("ハロー・ワールド".as_bytes()),
            Encoding::Base64
        );
        assert_eq!(longest_line(b"ab\ncdef\r\ngh"), 4);
    }
}
