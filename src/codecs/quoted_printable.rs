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

use crate::parsers::tokens::{is_blank, is_qpsafe};

pub static HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

#[inline(always)]
fn push_hex(output: &mut Vec<u8>, ch: u8) {
    output.push(b'=');
    output.push(HEX_DIGITS[(ch >> 4) as usize]);
    output.push(HEX_DIGITS[(ch & 0x0f) as usize]);
}

#[inline(always)]
pub(crate) fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

/// Quoted-printable encodes a chunk of text.
///
/// `state` holds the delayed last character (-1 for none): a trailing
/// space or tab is held back so it can be hex-encoded when it turns out
/// to sit at end of line. `save` is the current output column; a soft
/// break `=\n` is inserted when a line would pass 72 columns before a
/// hex triplet or 74 before a literal.
pub fn quoted_printable_encode_step(
    input: &[u8],
    output: &mut Vec<u8>,
    state: &mut i32,
    save: &mut u32,
) {
    let mut column = *save;
    let mut last = *state;

    for &ch in input {
        if ch == b'\r' {
            if last != -1 {
                push_hex(output, last as u8);
                column += 3;
            }
            last = ch as i32;
        } else if ch == b'\n' {
            if last != -1 && last != b'\r' as i32 {
                push_hex(output, last as u8);
            }
            output.push(b'\n');
            column = 0;
            last = -1;
        } else {
            if last != -1 {
                if is_qpsafe(last as u8) {
                    output.push(last as u8);
                    column += 1;
                } else {
                    push_hex(output, last as u8);
                    column += 3;
                }
            }

            if is_qpsafe(ch) {
                if column > 74 {
                    output.push(b'=');
                    output.push(b'\n');
                    column = 0;
                }

                // delay output of a blank so it can be escaped at EOL
                if is_blank(ch) {
                    last = ch as i32;
                } else {
                    output.push(ch);
                    column += 1;
                    last = -1;
                }
            } else {
                if column > 72 {
                    output.push(b'=');
                    output.push(b'\n');
                    column = 3;
                } else {
                    column += 3;
                }

                push_hex(output, ch);
                last = -1;
            }
        }
    }

    *save = column;
    *state = last;
}

/// Flushes the delayed character; a trailing blank is hex-encoded, and a
/// final `=\n` keeps the soft end of line from decoding as a real one.
pub fn quoted_printable_encode_close(
    input: &[u8],
    output: &mut Vec<u8>,
    state: &mut i32,
    save: &mut u32,
) {
    if !input.is_empty() {
        quoted_printable_encode_step(input, output, state, save);
    }

    let last = *state;
    if last != -1 {
        if is_qpsafe(last as u8) && !is_blank(last as u8) {
            output.push(last as u8);
        } else {
            push_hex(output, last as u8);
        }
    }

    if last != b'\n' as i32 {
        output.push(b'=');
        output.push(b'\n');
    }

    *save = 0;
    *state = -1;
}

/// Decodes a chunk of quoted-printable data.
///
/// States: 0 literal, 1 saw `=`, 2 saw `=` and one hex digit (in
/// `save`). `=\n` is consumed without output; a non-hex sequence after
/// `=` is emitted literally.
pub fn quoted_printable_decode_step(
    input: &[u8],
    output: &mut Vec<u8>,
    state: &mut i32,
    save: &mut u32,
) {
    let mut current = *state;
    let mut first = *save;

    for &ch in input {
        match current {
            0 => {
                if ch == b'=' {
                    current = 1;
                } else {
                    output.push(ch);
                }
            }
            1 => {
                if ch == b'\n' {
                    // soft break, unix end of line
                    current = 0;
                } else {
                    first = ch as u32;
                    current = 2;
                }
            }
            _ => {
                match (hex_value(first as u8), hex_value(ch)) {
                    (Some(hex1), Some(hex2)) => output.push((hex1 << 4) | hex2),
                    _ => {
                        if ch == b'\n' && first == b'\r' as u32 {
                            // soft break, canonical end of line
                        } else {
                            output.push(b'=');
                            output.push(first as u8);
                            output.push(ch);
                        }
                    }
                }
                current = 0;
            }
        }
    }

    *state = current;
    *save = first;
}

#[cfg(test)]
mod tests {
    use super::{
        quoted_printable_decode_step, quoted_printable_encode_close, quoted_printable_encode_step,
    };

    fn encode(input: &[u8]) -> String {
        let (mut state, mut save) = (-1, 0);
        let mut output = Vec::new();
        quoted_printable_encode_close(input, &mut output, &mut state, &mut save);
        String::from_utf8(output).unwrap()
    }

    fn decode(input: &[u8]) -> Vec<u8> {
        let (mut state, mut save) = (0, 0);
        let mut output = Vec::new();
        quoted_printable_decode_step(input, &mut output, &mut state, &mut save);
        output
    }

    #[test]
    fn encode_escapes() {
        for (input, expected) in [
            (&b"hello"[..], "hello=\n"),
            ("café".as_bytes(), "caf=C3=A9=\n"),
            (b"line\n", "line\n=\n"),
            (b"trailing \n", "trailing=20\n=\n"),
            (b"trailing\t", "trailing=09=\n"),
            (b"a=b", "a=3Db=\n"),
        ] {
            assert_eq!(encode(input), expected, "failed for {input:?}");
        }
    }

    #[test]
    fn encode_soft_breaks() {
        let encoded = encode(&[b'x'; 200]);
        for line in encoded.trim_end().split('\n') {
            assert!(line.len() <= 76, "line too long: {line:?}");
        }
        assert_eq!(
            decode(encoded.as_bytes()),
            vec![b'x'; 200],
            "soft breaks must decode away"
        );
    }

    #[test]
    fn decode_tolerates_invalid_escapes() {
        for (input, expected) in [
            (&b"=41"[..], &b"A"[..]),
            (b"=4a", b"J"),
            (b"a=\nb", b"ab"),
            (b"a=\r\nb", b"ab"),
            (b"=XY", b"=XY"),
            (b"100%=", b"100%"),
            (b"Keld J=F8rn", b"Keld J\xf8rn"),
        ] {
            assert_eq!(decode(input), expected, "failed for {input:?}");
        }
    }

    #[test]
    fn decode_across_chunks() {
        let (mut state, mut save) = (0, 0);
        let mut output = Vec::new();
        quoted_printable_decode_step(b"caf=", &mut output, &mut state, &mut save);
        quoted_printable_decode_step(b"C", &mut output, &mut state, &mut save);
        quoted_printable_decode_step(b"3=A9", &mut output, &mut state, &mut save);
        assert_eq!(output, "café".as_bytes());
    }
}
