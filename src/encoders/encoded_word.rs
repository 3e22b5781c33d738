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
    codecs::base64::BASE64_ALPHABET,
    codecs::quoted_printable::HEX_DIGITS,
    parsers::tokens::{is_esafe, is_psafe},
};

/// Maximum length of one encoded word, per RFC 2047 section 2.
const MAX_WORD_LEN: usize = 75;

/// True when `text` can be written into an unstructured header without
/// an encoded word.
pub fn is_ascii_safe(text: &str) -> bool {
    text.bytes().all(|ch| ch >= b' ' && ch != 0x7f)
}

/// True for a word that must be wrapped in an encoded word: 8-bit
/// bytes, controls, or something that would parse back as one.
pub fn needs_encoding(word: &str) -> bool {
    word.contains("=?") || !is_ascii_safe(word)
}

#[inline(always)]
fn is_safe(ch: u8, phrase: bool) -> bool {
    if phrase {
        ch.is_ascii_alphanumeric() || is_psafe(ch)
    } else {
        is_esafe(ch) && ch != b' '
    }
}

/// Encodes `text` as UTF-8 encoded words, one token per returned entry.
/// The variant is chosen per content: Q while no more than 17% of the
/// bytes are non-ASCII, B otherwise. Each token fits the fold limit;
/// whitespace between consecutive tokens disappears when decoded, so a
/// run of any length round-trips.
pub fn rfc2047_encode(text: &str, phrase: bool) -> Vec<String> {
    let non_ascii = text.bytes().filter(|&ch| ch > 127).count();
    if non_ascii as f32 <= text.len() as f32 * 0.17 {
        encode_quoted(text, phrase)
    } else {
        encode_base64(text)
    }
}

fn encode_quoted(text: &str, phrase: bool) -> Vec<String> {
    let room = MAX_WORD_LEN - "=?utf-8?Q??=".len();
    let mut words = Vec::new();
    let mut encoded = String::new();
    let mut used = 0;

    for ch in text.chars() {
        let mut buf = [0u8; 4];
        let bytes = ch.encode_utf8(&mut buf).as_bytes();
        let cost: usize = bytes
            .iter()
            .map(|&byte| if is_safe(byte, phrase) || byte == b' ' { 1 } else { 3 })
            .sum();

        if used + cost > room {
            words.push(format!("=?utf-8?Q?{encoded}?="));
            encoded.clear();
            used = 0;
        }

        for &byte in bytes {
            if byte == b' ' {
                encoded.push('_');
            } else if is_safe(byte, phrase) {
                encoded.push(byte as char);
            } else {
                encoded.push('=');
                encoded.push(HEX_DIGITS[(byte >> 4) as usize] as char);
                encoded.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
            }
        }
        used += cost;
    }

    words.push(format!("=?utf-8?Q?{encoded}?="));
    words
}

fn encode_base64(text: &str) -> Vec<String> {
    // bytes per word, rounded down to whole 3-byte groups
    let room = (MAX_WORD_LEN - "=?utf-8?B??=".len()) / 4 * 3;
    let mut words = Vec::new();
    let mut chunk: Vec<u8> = Vec::with_capacity(room + 4);

    for ch in text.chars() {
        let mut buf = [0u8; 4];
        let bytes = ch.encode_utf8(&mut buf).as_bytes();
        if chunk.len() + bytes.len() > room {
            words.push(base64_word(&chunk));
            chunk.clear();
        }
        chunk.extend_from_slice(bytes);
    }

    words.push(base64_word(&chunk));
    words
}

fn base64_word(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() / 3 * 4 + 16);
    encoded.push_str("=?utf-8?B?");

    for group in bytes.chunks(3) {
        let (b0, b1, b2) = (
            group[0],
            group.get(1).copied().unwrap_or(0),
            group.get(2).copied().unwrap_or(0),
        );
        encoded.push(BASE64_ALPHABET[(b0 >> 2) as usize] as char);
        encoded.push(BASE64_ALPHABET[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
        encoded.push(if group.len() > 1 {
            BASE64_ALPHABET[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char
        } else {
            '='
        });
        encoded.push(if group.len() > 2 {
            BASE64_ALPHABET[(b2 & 0x3f) as usize] as char
        } else {
            '='
        });
    }

    encoded.push_str("?=");
    encoded
}

/// Encodes unstructured header text into foldable tokens: plain words
/// stay as they are, runs of words that need encoding collapse into
/// encoded words.
pub fn encode_unstructured(text: &str) -> Vec<String> {
    encode_words(text, false)
}

/// Encodes a display-name phrase into foldable tokens using the
/// stricter phrase-safe set.
pub fn encode_phrase(text: &str) -> Vec<String> {
    encode_words(text, true)
}

fn encode_words(text: &str, phrase: bool) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut run = String::new();

    for word in text.split_whitespace() {
        if needs_encoding(word) {
            // adjacent words in need of encoding share encoded words so
            // the space between them survives decoding
            if !run.is_empty() {
                run.push(' ');
            }
            run.push_str(word);
        } else {
            if !run.is_empty() {
                tokens.extend(rfc2047_encode(&run, phrase));
                run.clear();
            }
            tokens.push(word.to_string());
        }
    }

    if !run.is_empty() {
        tokens.extend(rfc2047_encode(&run, phrase));
    }

    tokens
}

#[cfg(test)]
mod tests {
    use crate::{core::options::ParserOptions, parsers::MessageStream};

    use super::{encode_phrase, encode_unstructured, rfc2047_encode, MAX_WORD_LEN};

    fn decode_tokens(tokens: &[String]) -> String {
        // join and run through the decoder the way a header parser would
        let header = format!("{}\n", tokens.join(" "));
        MessageStream::new(header.as_bytes())
            .parse_unstructured(&ParserOptions::default())
            .into_text()
            .unwrap_or_default()
            .into_owned()
    }

    #[test]
    fn picks_variant_by_density() {
        assert!(rfc2047_encode("mostly ascii text é", false)[0].starts_with("=?utf-8?Q?"));
        assert!(rfc2047_encode("ハロー・ワールド", false)[0].starts_with("=?utf-8?B?"));
    }

    #[test]
    fn words_fit_fold_limit() {
        for text in [
            " Céci est une très longue phrase avec beaucoup de caractères accentués répétés ",
            "日本語のかなり長いテキストを繰り返します。",
        ] {
            let long_text = text.repeat(8);
            for token in rfc2047_encode(&long_text, false) {
                assert!(token.len() <= MAX_WORD_LEN, "token too long: {token}");
            }
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        for text in [
            "åoÄ",
            "Hello ångström world",
            "plain ascii only",
            "mixed ascii 中文 words 汉字 here",
            "la square root of x² =? x",
        ] {
            let tokens = encode_unstructured(text);
            assert_eq!(
                decode_tokens(&tokens),
                text.split_whitespace().collect::<Vec<_>>().join(" "),
                "failed for {text:?} via {tokens:?}"
            );
        }
    }

    #[test]
    fn phrase_uses_stricter_safe_set() {
        // '#' is esafe but not psafe, so only a phrase escapes it
        let tokens = encode_phrase("Encyclopédie#");
        assert_eq!(tokens, ["=?utf-8?Q?Encyclop=C3=A9die=23?="]);

        let tokens = encode_unstructured("Encyclopédie#");
        assert_eq!(tokens, ["=?utf-8?Q?Encyclop=C3=A9die#?="]);
    }
}
