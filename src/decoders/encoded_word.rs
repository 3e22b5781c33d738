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

use crate::{
    codecs::{base64::BASE64_RANK, quoted_printable::hex_value},
    core::options::ParserOptions,
    parsers::MessageStream,
};

use super::charsets::decode_utf8_lossy;

enum Rfc2047State {
    Charset,
    Language,
    Encoding,
}

impl<'x> MessageStream<'x> {
    /// Decodes an RFC 2047 encoded word. The caller has consumed the
    /// leading `=` and seen the `?`; on failure the caller restores its
    /// checkpoint so the raw text is preserved.
    pub fn decode_rfc2047(&mut self, options: &ParserOptions) -> Option<String> {
        if !self.try_skip_char(b'?') {
            return None;
        }

        let mut state = Rfc2047State::Charset;
        let charset_start = self.offset();
        let mut charset_end = charset_start;
        let mut is_quoted_printable = false;

        loop {
            let ch = *self.next()?;
            match state {
                Rfc2047State::Charset => match ch {
                    b'?' => {
                        if charset_end == charset_start {
                            return None;
                        }
                        state = Rfc2047State::Encoding;
                    }
                    b'*' => {
                        if charset_end == charset_start {
                            return None;
                        }
                        state = Rfc2047State::Language;
                    }
                    b'\n' | b'=' => return None,
                    _ => charset_end = self.offset(),
                },
                Rfc2047State::Language => match ch {
                    // the language tag is ignored
                    b'?' => state = Rfc2047State::Encoding,
                    b'\n' | b'=' => return None,
                    _ => (),
                },
                Rfc2047State::Encoding => {
                    match ch {
                        b'q' | b'Q' => is_quoted_printable = true,
                        b'b' | b'B' => is_quoted_printable = false,
                        _ => return None,
                    }
                    if !self.try_skip_char(b'?') {
                        return None;
                    }
                    break;
                }
            }
        }

        let bytes = if is_quoted_printable {
            self.decode_quoted_printable_word(options)?
        } else {
            self.decode_base64_word()?
        };

        let charset = decode_utf8_lossy(self.bytes(charset_start..charset_end));
        Some(
            options
                .charsets
                .decode(&charset, &bytes)
                .unwrap_or_else(|| decode_utf8_lossy(&bytes)),
        )
    }

    /// Q encoding: `_` is a space, `=XX` a hex escape. Stops at `?=`.
    fn decode_quoted_printable_word(&mut self, options: &ParserOptions) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);

        while let Some(&ch) = self.next() {
            match ch {
                b'?' => {
                    if self.try_skip_char(b'=') {
                        return Some(buf);
                    }
                    buf.push(b'?');
                }
                b'_' => buf.push(b' '),
                b'=' => {
                    let hex1 = hex_value(*self.next()?)?;
                    let hex2 = hex_value(*self.next()?)?;
                    buf.push((hex1 << 4) | hex2);
                }
                b'\n' => {
                    // folded line; only continuation whitespace may follow
                    if !self.peek_next_is_space() {
                        return None;
                    }
                    while self.try_next_is_space() {}
                }
                b'\r' => (),
                b' ' | b'\t' if options.rfc2047_compliance.is_strict() => return None,
                _ => buf.push(ch),
            }
        }

        None
    }

    /// B encoding: base64 without padding requirements, whitespace and
    /// folds tolerated. Stops at `?=`.
    fn decode_base64_word(&mut self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        let mut chunk: u32 = 0;
        let mut filled = 0;

        while let Some(&ch) = self.next() {
            match ch {
                b'?' => {
                    return if self.try_skip_char(b'=') {
                        Some(buf)
                    } else {
                        None
                    };
                }
                b'=' => {
                    // padding closes the current quantum
                    match filled {
                        2 => buf.push((chunk >> 4) as u8),
                        3 => {
                            buf.push((chunk >> 10) as u8);
                            buf.push((chunk >> 2) as u8);
                        }
                        _ => (),
                    }
                    chunk = 0;
                    filled = 0;
                }
                b'\n' => {
                    if !self.peek_next_is_space() {
                        return None;
                    }
                }
                b' ' | b'\t' | b'\r' => (),
                _ => {
                    let rank = BASE64_RANK[ch as usize];
                    if rank == 0xff {
                        return None;
                    }
                    chunk = (chunk << 6) | rank as u32;
                    filled += 1;
                    if filled == 4 {
                        buf.push((chunk >> 16) as u8);
                        buf.push((chunk >> 8) as u8);
                        buf.push(chunk as u8);
                        chunk = 0;
                        filled = 0;
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use crate::{core::options::ParserOptions, parsers::MessageStream};

    fn decode(input: &str) -> Option<String> {
        MessageStream::new(input.as_bytes()).decode_rfc2047(&ParserOptions::default())
    }

    #[test]
    fn decode_encoded_words() {
        for (input, expected) in [
            ("?iso-8859-1?q?this=20is=20some=20text?=", "this is some text"),
            ("?iso-8859-1?q?this is some text?=", "this is some text"),
            ("?US-ASCII?Q?Keith_Moore?=", "Keith Moore"),
            ("?ISO-8859-1?Q?Olle_J=E4rnefors?=", "Olle Järnefors"),
            ("?ISO-8859-1?Q?Patrik_F=E4ltstr=F6m?=", "Patrik Fältström"),
            (
                "?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?=",
                "If you can read this yo",
            ),
            ("?utf-8?B?w6Vvw4Q=?=", "åoÄ"),
            ("?ISO-8859-1*en?Q?a?=", "a"),
            (
                "?utf-8*zh-CN?q?Th=C3=ADs_=C3=ADs_v=C3=A1l=C3=ADd?=",
                "Thís ís válíd",
            ),
            ("?utf-8?b?w6HDqcOt?=", "áéí"),
            ("?utf-8?q?folded=20\n text?=", "folded text"),
        ] {
            assert_eq!(
                decode(input).as_deref(),
                Some(expected),
                "failed for {input:?}"
            );
        }
    }

    #[test]
    fn reject_malformed_words() {
        for input in [
            "?utf-8?x?text?=",
            "??q?text?=",
            "?utf-8?q?text",
            "?utf-8?q?bad=XXhex?=",
            "?utf-8?b?????=",
            "?utf-8?b?w6H\nno-continuation?=",
        ] {
            assert_eq!(decode(input), None, "should have failed for {input:?}");
        }
    }

    #[test]
    fn strict_mode_rejects_spaces() {
        let options = ParserOptions::strict();
        assert_eq!(
            MessageStream::new(b"?iso-8859-1?q?this is some text?=").decode_rfc2047(&options),
            None
        );
    }
}
