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

use crate::{core::header::HeaderValue, parsers::MessageStream};

impl<'x> MessageStream<'x> {
    /// Parses one or more `<message-id>` tokens. Phrase tokens between
    /// ids are tolerated; text outside angle brackets is kept as a
    /// fallback value when no id was found.
    pub fn parse_id(&mut self) -> HeaderValue<'x> {
        let mut token_start: usize = 0;
        let mut token_end: usize = 0;
        let mut token_invalid_start: usize = 0;
        let mut token_invalid_end: usize = 0;
        let mut is_id_part = false;
        let mut ids: Vec<Cow<'x, str>> = Vec::new();

        while let Some(&ch) = self.next() {
            match ch {
                b'\n' => {
                    if self.try_next_is_space() {
                        continue;
                    }
                    break;
                }
                b'<' => {
                    is_id_part = true;
                    continue;
                }
                b'>' => {
                    is_id_part = false;
                    if token_start > 0 {
                        ids.push(String::from_utf8_lossy(
                            self.bytes(token_start - 1..token_end),
                        ));
                        token_start = 0;
                    }
                    continue;
                }
                b' ' | b'\t' | b'\r' => continue,
                _ => {}
            }
            if is_id_part {
                if token_start == 0 {
                    token_start = self.offset();
                }
                token_end = self.offset();
            } else {
                if token_invalid_start == 0 {
                    token_invalid_start = self.offset();
                }
                token_invalid_end = self.offset();
            }
        }

        match ids.len() {
            1 => HeaderValue::Text(ids.pop().unwrap()),
            0 => {
                if token_invalid_start > 0 {
                    // broken clients omit the angle brackets
                    HeaderValue::Text(String::from_utf8_lossy(
                        self.bytes(token_invalid_start - 1..token_invalid_end),
                    ))
                } else {
                    HeaderValue::Empty
                }
            }
            _ => HeaderValue::TextList(ids),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parsers::MessageStream;

    #[test]
    fn parse_message_ids() {
        for (input, expected) in [
            ("<1234@local.machine.example>\n", vec!["1234@local.machine.example"]),
            (
                "<1234@local.machine.example> <3456@example.net>\n",
                vec!["1234@local.machine.example", "3456@example.net"],
            ),
            (
                "<1234@local.machine.example>\n <3456@example.net> \n",
                vec!["1234@local.machine.example", "3456@example.net"],
            ),
            (
                "<testabcd.1234@silly.test>  (added by postmaster@silly.test)\n",
                vec!["testabcd.1234@silly.test"],
            ),
            ("bare-id@example.net\n", vec!["bare-id@example.net"]),
        ] {
            assert_eq!(
                MessageStream::new(input.as_bytes())
                    .parse_id()
                    .into_text_list()
                    .unwrap(),
                expected,
                "failed for {input:?}"
            );
        }
    }
}
