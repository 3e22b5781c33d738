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

use std::borrow::Cow;

use crate::{
    core::{header::HeaderValue, options::ParserOptions},
    parsers::MessageStream,
};

struct UnstructuredParser<'x> {
    token_start: usize,
    token_end: usize,
    tokens: Vec<Cow<'x, str>>,
    last_is_encoded: bool,
}

impl<'x> UnstructuredParser<'x> {
    fn add_token(&mut self, stream: &MessageStream<'x>) {
        if self.token_start > 0 {
            if !self.tokens.is_empty() {
                self.tokens.push(" ".into());
            }
            self.tokens.push(String::from_utf8_lossy(
                stream.bytes(self.token_start - 1..self.token_end),
            ));

            self.token_start = 0;
            self.last_is_encoded = false;
        }
    }

    fn add_rfc2047(&mut self, token: String) {
        // whitespace between two encoded words is ignored
        if !self.last_is_encoded && !self.tokens.is_empty() {
            self.tokens.push(" ".into());
        }
        self.tokens.push(token.into());
        self.last_is_encoded = true;
    }
}

impl<'x> MessageStream<'x> {
    /// Unfolds and RFC 2047 decodes unstructured header text, stopping
    /// at a newline without continuation whitespace.
    pub fn parse_unstructured(&mut self, options: &ParserOptions) -> HeaderValue<'x> {
        let mut parser = UnstructuredParser {
            token_start: 0,
            token_end: 0,
            tokens: Vec::new(),
            last_is_encoded: true,
        };

        while let Some(&ch) = self.next() {
            match ch {
                b'\n' => {
                    parser.add_token(self);

                    if !self.try_next_is_space() {
                        return match parser.tokens.len() {
                            1 => HeaderValue::Text(parser.tokens.pop().unwrap()),
                            0 => HeaderValue::Empty,
                            _ => HeaderValue::Text(parser.tokens.concat().into()),
                        };
                    } else {
                        continue;
                    }
                }
                b' ' | b'\t' | b'\r' => {
                    continue;
                }
                b'=' if self.peek_char(b'?') => {
                    self.checkpoint();
                    if let Some(token) = self.decode_rfc2047(options) {
                        parser.add_token(self);
                        parser.add_rfc2047(token);
                        continue;
                    }
                    self.restore();
                }
                _ => (),
            }

            if parser.token_start == 0 {
                parser.token_start = self.offset();
            }

            parser.token_end = self.offset();
        }

        parser.add_token(self);
        match parser.tokens.len() {
            1 => HeaderValue::Text(parser.tokens.pop().unwrap()),
            0 => HeaderValue::Empty,
            _ => HeaderValue::Text(parser.tokens.concat().into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{core::options::ParserOptions, parsers::MessageStream};

    #[test]
    fn parse_unstructured_text() {
        for (input, expected) in [
            ("Saying Hello\n", "Saying Hello"),
            ("Re: Saying\n Hello\n", "Re: Saying Hello"),
            (" folded\n\tacross\n lines\n", "folded across lines"),
            ("=?utf-8?B?w6Vvw4Q=?=\n", "åoÄ"),
            (
                "=?ISO-8859-1?Q?a?=\n =?ISO-8859-1?Q?b?=\n",
                "ab",
            ),
            ("before =?utf-8?Q?mid=C3=A5?= after\n", "before midå after"),
            ("=?broken?\n", "=?broken?"),
            ("   \n", ""),
        ] {
            assert_eq!(
                MessageStream::new(input.as_bytes())
                    .parse_unstructured(&ParserOptions::default())
                    .into_text()
                    .unwrap_or_default(),
                expected,
                "failed for {input:?}"
            );
        }
    }
}
