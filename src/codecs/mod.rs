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

pub mod base64;
pub mod quoted_printable;
pub mod uuencode;

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A MIME Content-Transfer-Encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Encoding {
    #[default]
    Default,
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
    UuEncode,
}

impl Encoding {
    pub fn parse(value: &str) -> Encoding {
        let value = value.trim();
        if value.eq_ignore_ascii_case("7bit") {
            Encoding::SevenBit
        } else if value.eq_ignore_ascii_case("8bit") {
            Encoding::EightBit
        } else if value.eq_ignore_ascii_case("binary") {
            Encoding::Binary
        } else if value.eq_ignore_ascii_case("base64") {
            Encoding::Base64
        } else if value.eq_ignore_ascii_case("quoted-printable") {
            Encoding::QuotedPrintable
        } else if value.eq_ignore_ascii_case("x-uuencode")
            || value.eq_ignore_ascii_case("uuencode")
            || value.eq_ignore_ascii_case("x-uue")
        {
            Encoding::UuEncode
        } else {
            Encoding::Default
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Default => "",
            Encoding::SevenBit => "7bit",
            Encoding::EightBit => "8bit",
            Encoding::Binary => "binary",
            Encoding::Base64 => "base64",
            Encoding::QuotedPrintable => "quoted-printable",
            Encoding::UuEncode => "x-uuencode",
        }
    }

    /// Whether bytes pass through this encoding unchanged.
    pub fn is_identity(&self) -> bool {
        !matches!(
            self,
            Encoding::Base64 | Encoding::QuotedPrintable | Encoding::UuEncode
        )
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resumable transfer-encoding state machine.
///
/// `state` and `save` carry the partial quantum between chunks that do not
/// arrive aligned on codec boundaries. Feed input with [`Codec::step`] and
/// finish with [`Codec::flush`]; `reset` makes the state reusable.
#[derive(Debug, Clone)]
pub struct Codec {
    encoding: Encoding,
    encode: bool,
    state: i32,
    save: u32,
    uubuf: [u8; 60],
}

impl Codec {
    pub fn encoder(encoding: Encoding) -> Self {
        let mut codec = Codec {
            encoding,
            encode: true,
            state: 0,
            save: 0,
            uubuf: [0; 60],
        };
        codec.reset();
        codec
    }

    pub fn decoder(encoding: Encoding) -> Self {
        let mut codec = Codec {
            encoding,
            encode: false,
            state: 0,
            save: 0,
            uubuf: [0; 60],
        };
        codec.reset();
        codec
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn reset(&mut self) {
        self.state = if self.encode && self.encoding == Encoding::QuotedPrintable {
            -1
        } else {
            0
        };
        self.save = 0;
    }

    /// Upper bound on the output produced for `len` input bytes.
    pub fn output_len(&self, len: usize) -> usize {
        match self.encoding {
            Encoding::Base64 => {
                if self.encode {
                    (len + 2) / 57 * 77 + 77
                } else {
                    len + 3
                }
            }
            Encoding::QuotedPrintable => {
                if self.encode {
                    (len / 24 + 1) * 74 + 74
                } else {
                    len + 2
                }
            }
            Encoding::UuEncode => {
                if self.encode {
                    (len + 2) / 45 * 62 + 64
                } else {
                    len + 3
                }
            }
            _ => len,
        }
    }

    /// Encodes or decodes a chunk of data, appending to `output`.
    pub fn step(&mut self, input: &[u8], output: &mut Vec<u8>) {
        match (self.encoding, self.encode) {
            (Encoding::Base64, true) => {
                base64::base64_encode_step(input, output, &mut self.state, &mut self.save)
            }
            (Encoding::Base64, false) => {
                base64::base64_decode_step(input, output, &mut self.state, &mut self.save)
            }
            (Encoding::QuotedPrintable, true) => quoted_printable::quoted_printable_encode_step(
                input,
                output,
                &mut self.state,
                &mut self.save,
            ),
            (Encoding::QuotedPrintable, false) => quoted_printable::quoted_printable_decode_step(
                input,
                output,
                &mut self.state,
                &mut self.save,
            ),
            (Encoding::UuEncode, true) => uuencode::uuencode_step(
                input,
                output,
                &mut self.uubuf,
                &mut self.state,
                &mut self.save,
            ),
            (Encoding::UuEncode, false) => {
                uuencode::uudecode_step(input, output, &mut self.state, &mut self.save)
            }
            _ => output.extend_from_slice(input),
        }
    }

    /// Flushes any leftover state after the final chunk.
    pub fn flush(&mut self, input: &[u8], output: &mut Vec<u8>) {
        match (self.encoding, self.encode) {
            (Encoding::Base64, true) => {
                base64::base64_encode_close(input, output, &mut self.state, &mut self.save)
            }
            (Encoding::QuotedPrintable, true) => quoted_printable::quoted_printable_encode_close(
                input,
                output,
                &mut self.state,
                &mut self.save,
            ),
            (Encoding::UuEncode, true) => uuencode::uuencode_close(
                input,
                output,
                &mut self.uubuf,
                &mut self.state,
                &mut self.save,
            ),
            _ => self.step(input, output),
        }
    }

    /// True when a decode ended in the middle of a codec quantum.
    pub fn is_truncated(&self) -> bool {
        !self.encode
            && match self.encoding {
                Encoding::Base64 => self.state & 0xff != 0,
                Encoding::QuotedPrintable => self.state != 0,
                Encoding::UuEncode => self.state & 0xff != 0,
                _ => false,
            }
    }
}

/// Convenience one-shot encode.
pub fn encode(encoding: Encoding, input: &[u8]) -> Vec<u8> {
    let mut codec = Codec::encoder(encoding);
    let mut output = Vec::with_capacity(codec.output_len(input.len()));
    codec.flush(input, &mut output);
    output
}

/// Convenience one-shot decode.
pub fn decode(encoding: Encoding, input: &[u8]) -> Vec<u8> {
    let mut codec = Codec::decoder(encoding);
    let mut output = Vec::with_capacity(codec.output_len(input.len()));
    codec.flush(input, &mut output);
    output
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, Codec, Encoding};

    #[test]
    fn encoding_names() {
        for (name, expected) in [
            ("base64", Encoding::Base64),
            ("BASE64", Encoding::Base64),
            (" quoted-printable ", Encoding::QuotedPrintable),
            ("x-uuencode", Encoding::UuEncode),
            ("7bit", Encoding::SevenBit),
            ("8BIT", Encoding::EightBit),
            ("binary", Encoding::Binary),
            ("gzip", Encoding::Default),
        ] {
            assert_eq!(Encoding::parse(name), expected, "failed for {name:?}");
        }
    }

    #[test]
    fn base64_single_byte_steps() {
        // Feeding one byte at a time must produce the same bytes as a
        // single pass.
        let mut codec = Codec::encoder(Encoding::Base64);
        let mut output = Vec::new();
        for ch in b"Man" {
            codec.step(&[*ch], &mut output);
        }
        codec.flush(&[], &mut output);
        assert_eq!(output, b"TWFu\n");

        let mut codec = Codec::decoder(Encoding::Base64);
        let mut decoded = Vec::new();
        for ch in output {
            codec.step(&[ch], &mut decoded);
        }
        assert_eq!(decoded, b"Man");
    }

    #[test]
    fn round_trip_all_codecs() {
        let data: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
        for encoding in [
            Encoding::Base64,
            Encoding::QuotedPrintable,
            Encoding::UuEncode,
        ] {
            let encoded = encode(encoding, &data);
            assert_eq!(
                decode(encoding, &encoded),
                data,
                "round trip failed for {encoding:?}"
            );
        }
    }

    #[test]
    fn round_trip_chunked() {
        let data: Vec<u8> = (0u8..=255).collect();
        for encoding in [
            Encoding::Base64,
            Encoding::QuotedPrintable,
            Encoding::UuEncode,
        ] {
            let mut codec = Codec::encoder(encoding);
            let mut encoded = Vec::new();
            for chunk in data.chunks(7) {
                codec.step(chunk, &mut encoded);
            }
            codec.flush(&[], &mut encoded);

            let mut codec = Codec::decoder(encoding);
            let mut decoded = Vec::new();
            for chunk in encoded.chunks(5) {
                codec.step(chunk, &mut decoded);
            }
            codec.flush(&[], &mut decoded);
            assert_eq!(decoded, data, "chunked round trip failed for {encoding:?}");
        }
    }

    #[test]
    fn output_len_covers_actual_output() {
        let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        for encoding in [
            Encoding::Base64,
            Encoding::QuotedPrintable,
            Encoding::UuEncode,
        ] {
            let codec = Codec::encoder(encoding);
            assert!(encode(encoding, &data).len() <= codec.output_len(data.len()));
        }
    }
}
