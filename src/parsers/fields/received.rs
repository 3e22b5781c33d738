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
    core::{datetime::DateTime, header::HeaderValue, options::ParserOptions},
    parsers::MessageStream,
};

impl<'x> MessageStream<'x> {
    /// Unfolds a Received field, keeping its token text verbatim. The
    /// date after the final `;` is recovered with [`received_date`].
    pub fn parse_received(&mut self, _options: &ParserOptions) -> HeaderValue<'x> {
        let mut token_start = 0;
        let mut token_end = 0;
        let mut tokens: Vec<Cow<'x, str>> = Vec::new();

        while let Some(&ch) = self.next() {
            match ch {
                b'\n' => {
                    if token_start > 0 {
                        if !tokens.is_empty() {
                            tokens.push(" ".into());
                        }
                        tokens.push(String::from_utf8_lossy(
                            self.bytes(token_start - 1..token_end),
                        ));
                        token_start = 0;
                    }
                    if self.try_next_is_space() {
                        continue;
                    }
                    break;
                }
                b' ' | b'\t' | b'\r' => {
                    if token_start > 0 {
                        if !tokens.is_empty() {
                            tokens.push(" ".into());
                        }
                        tokens.push(String::from_utf8_lossy(
                            self.bytes(token_start - 1..token_end),
                        ));
                        token_start = 0;
                    }
                }
                _ => {
                    if token_start == 0 {
                        token_start = self.offset();
                    }
                    token_end = self.offset();
                }
            }
        }

        match tokens.len() {
            0 => HeaderValue::Empty,
            1 => HeaderValue::Text(tokens.pop().unwrap()),
            _ => HeaderValue::Text(tokens.concat().into()),
        }
    }
}

/// The timestamp a Received field carries after its final `;`.
pub fn received_date(received: &str, options: &ParserOptions) -> Option<DateTime> {
    let tail = received.rsplit(';').next()?;
    let mut input = Vec::with_capacity(tail.len() + 1);
    input.extend_from_slice(tail.as_bytes());
    input.push(b'\n');
    // probing only, a missing date is not a defect
    let options = ParserOptions {
        warning_callback: None,
        ..options.clone()
    };
    match MessageStream::new(&input).parse_date(&options) {
        HeaderValue::DateTime(datetime) if datetime.to_timestamp() != 0 => Some(datetime),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::{core::options::ParserOptions, parsers::MessageStream};

    use super::received_date;

    #[test]
    fn unfold_received() {
        let value = MessageStream::new(
            concat!(
                "from x.y.test\n   by example.net\n   via TCP\n",
                "   with ESMTP\n   id ABC12345;\n",
                "   Sat, 20 Nov 2021 14:22:01 -0800\n"
            )
            .as_bytes(),
        )
        .parse_received(&ParserOptions::default())
        .into_text()
        .unwrap();

        assert_eq!(
            value,
            "from x.y.test by example.net via TCP with ESMTP id ABC12345; Sat, 20 Nov 2021 14:22:01 -0800"
        );

        let date = received_date(&value, &ParserOptions::default()).unwrap();
        assert_eq!(date.to_rfc3339(), "2021-11-20T14:22:01-08:00");
    }
}
