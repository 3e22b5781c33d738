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
    core::{
        address::{AddressList, Group, Mailbox},
        header::HeaderValue,
        options::{ParserOptions, Warning},
    },
    parsers::MessageStream,
};

#[derive(PartialEq, Clone, Copy, Debug)]
enum AddressState {
    Address,
    Name,
    Quote,
    Comment,
}

pub struct AddressParser<'x> {
    token_start: usize,
    token_end: usize,

    is_token_email: bool,
    is_token_start: bool,
    is_escaped: bool,

    name_tokens: Vec<Cow<'x, str>>,
    mail_tokens: Vec<Cow<'x, str>>,
    comment_tokens: Vec<Cow<'x, str>>,

    state: AddressState,
    state_stack: Vec<AddressState>,

    group: Option<Group<'x>>,
    result: AddressList<'x>,

    addr_offset: usize,
}

impl<'x> AddressParser<'x> {
    pub fn add_token(&mut self, stream: &MessageStream<'x>, add_trail_space: bool) {
        if self.token_start > 0 {
            let token = String::from_utf8_lossy(stream.bytes(self.token_start - 1..self.token_end));
            let mut add_space = false;
            let list = match self.state {
                AddressState::Address => &mut self.mail_tokens,
                AddressState::Name => {
                    if self.is_token_email {
                        &mut self.mail_tokens
                    } else {
                        add_space = true;
                        &mut self.name_tokens
                    }
                }
                AddressState::Quote => &mut self.name_tokens,
                AddressState::Comment => {
                    add_space = true;
                    &mut self.comment_tokens
                }
            };

            if self.addr_offset == 0 {
                self.addr_offset = self.token_start;
            }

            if add_space && !list.is_empty() {
                list.push(" ".into());
            }

            list.push(token);

            if add_trail_space {
                list.push(" ".into());
            }

            self.token_start = 0;
            self.is_token_email = false;
            self.is_token_start = true;
            self.is_escaped = false;
        }
    }

    /// Builds a mailbox out of the collected tokens and files it under
    /// the open group or the top-level list, applying the compliance
    /// mode to defective entries.
    pub fn add_address(&mut self, options: &ParserOptions) {
        let has_mail = !self.mail_tokens.is_empty();
        let has_name = !self.name_tokens.is_empty();
        let has_comment = !self.comment_tokens.is_empty();
        let offset = std::mem::take(&mut self.addr_offset).saturating_sub(1) as i64;

        let mailbox = if has_mail && has_name && has_comment {
            Some(Mailbox::new(
                Some(
                    format!(
                        "{} ({})",
                        concat_tokens(&mut self.name_tokens),
                        concat_tokens(&mut self.comment_tokens)
                    )
                    .into(),
                ),
                concat_tokens(&mut self.mail_tokens),
            ))
        } else if has_name && has_mail {
            Some(Mailbox::new(
                Some(concat_tokens(&mut self.name_tokens)),
                concat_tokens(&mut self.mail_tokens),
            ))
        } else if has_mail && has_comment {
            Some(Mailbox::new(
                Some(concat_tokens(&mut self.comment_tokens)),
                concat_tokens(&mut self.mail_tokens),
            ))
        } else if has_mail {
            Some(Mailbox::new(None, concat_tokens(&mut self.mail_tokens)))
        } else if has_name || has_comment {
            // a bare phrase, only ever an address in tolerant mode
            let phrase = if has_name {
                concat_tokens(&mut self.name_tokens)
            } else {
                concat_tokens(&mut self.comment_tokens)
            };
            self.comment_tokens.clear();
            Some(Mailbox::new(None, phrase))
        } else {
            return;
        };

        let mailbox = match mailbox {
            Some(mailbox) => mailbox,
            None => return,
        };

        // a grammatical mailbox has a local part and a domain
        let is_complete = mailbox
            .at_index
            .is_some_and(|at| at + 1 < mailbox.address.len());

        if !is_complete {
            let keep = !options.address_compliance.is_strict()
                && options.allow_addresses_without_domain
                && !mailbox.address.is_empty();
            if !keep {
                options.warn(offset, Warning::InvalidAddressList, mailbox.address.as_ref());
                return;
            }
        }

        match &mut self.group {
            Some(group) => group.members.push(mailbox),
            None => self.result.push(mailbox),
        }
    }

    pub fn start_group(&mut self) {
        self.end_group();

        let name = if !self.name_tokens.is_empty() {
            Some(concat_tokens(&mut self.name_tokens))
        } else if !self.mail_tokens.is_empty() {
            Some(concat_tokens(&mut self.mail_tokens))
        } else if !self.comment_tokens.is_empty() {
            Some(concat_tokens(&mut self.comment_tokens))
        } else {
            None
        };
        self.mail_tokens.clear();
        self.comment_tokens.clear();
        self.addr_offset = 0;

        self.group = Some(Group {
            name,
            members: AddressList::new(),
        });
    }

    pub fn end_group(&mut self) {
        if let Some(group) = self.group.take() {
            self.result.push(group);
        }
    }
}

impl<'x> MessageStream<'x> {
    /// Parses an RFC 5322 address list: mailboxes, angle-addr forms and
    /// groups. Loose mode recovers the common defects of RFC 7103
    /// section 7; strict mode drops anything non-grammatical with a
    /// warning.
    pub fn parse_address(&mut self, options: &ParserOptions) -> HeaderValue<'x> {
        let mut parser = AddressParser {
            token_start: 0,
            token_end: 0,

            is_token_email: false,
            is_token_start: true,
            is_escaped: false,

            name_tokens: Vec::with_capacity(3),
            mail_tokens: Vec::with_capacity(3),
            comment_tokens: Vec::with_capacity(3),

            state: AddressState::Name,
            state_stack: Vec::with_capacity(5),

            group: None,
            result: AddressList::new(),

            addr_offset: 0,
        };

        while let Some(ch) = self.next() {
            match ch {
                b'\n' => {
                    parser.add_token(self, false);
                    if self.try_next_is_space() {
                        if !parser.is_token_start {
                            parser.is_token_start = true;
                        }
                        continue;
                    } else {
                        break;
                    }
                }
                b'\\' if parser.state != AddressState::Name && !parser.is_escaped => {
                    if parser.token_start > 0 {
                        if parser.state == AddressState::Quote {
                            parser.token_end = self.offset() - 1;
                        }
                        parser.add_token(self, false);
                    }
                    parser.is_escaped = true;
                    continue;
                }
                b',' if parser.state == AddressState::Name => {
                    parser.add_token(self, false);
                    parser.add_address(options);
                    continue;
                }
                b'<' if parser.state == AddressState::Name => {
                    parser.is_token_email = false;
                    parser.add_token(self, false);
                    parser.state_stack.push(AddressState::Name);
                    parser.state = AddressState::Address;
                    continue;
                }
                b'>' if parser.state == AddressState::Address => {
                    parser.add_token(self, false);
                    parser.state = parser.state_stack.pop().unwrap_or(AddressState::Name);
                    continue;
                }
                b'"' if !parser.is_escaped => match parser.state {
                    AddressState::Name => {
                        parser.state_stack.push(AddressState::Name);
                        parser.state = AddressState::Quote;
                        parser.add_token(self, false);
                        continue;
                    }
                    AddressState::Quote => {
                        parser.add_token(self, false);
                        parser.state = parser.state_stack.pop().unwrap_or(AddressState::Name);
                        continue;
                    }
                    _ => (),
                },
                b'@' if parser.state == AddressState::Name => {
                    parser.is_token_email = true;
                }
                b'=' if parser.is_token_start && !parser.is_escaped && self.peek_char(b'?') => {
                    self.checkpoint();
                    if let Some(token) = self.decode_rfc2047(options) {
                        let add_space = parser.state != AddressState::Quote;
                        parser.add_token(self, add_space);
                        (if parser.state != AddressState::Comment {
                            &mut parser.name_tokens
                        } else {
                            &mut parser.comment_tokens
                        })
                        .push(token.into());
                        continue;
                    }
                    self.restore();
                }
                b' ' | b'\t' => {
                    if !parser.is_token_start {
                        parser.is_token_start = true;
                    }
                    if parser.is_escaped {
                        parser.is_escaped = false;
                    }
                    if parser.state == AddressState::Quote {
                        if parser.token_start == 0 {
                            parser.token_start = self.offset();
                            parser.token_end = parser.token_start;
                        } else {
                            parser.token_end = self.offset();
                        }
                    }
                    continue;
                }
                b'\r' => continue,
                b'(' if parser.state != AddressState::Quote && !parser.is_escaped => {
                    parser.state_stack.push(parser.state);
                    if parser.state != AddressState::Comment {
                        parser.add_token(self, false);
                        parser.state = AddressState::Comment;
                        continue;
                    }
                }
                b')' if parser.state == AddressState::Comment && !parser.is_escaped => {
                    let new_state = parser.state_stack.pop().unwrap_or(AddressState::Name);
                    if parser.state != new_state {
                        parser.add_token(self, false);
                        parser.state = new_state;
                        continue;
                    }
                }
                b':' if parser.state == AddressState::Name && !parser.is_escaped => {
                    parser.add_token(self, false);
                    parser.start_group();
                    continue;
                }
                b';' if parser.state == AddressState::Name => {
                    parser.add_token(self, false);
                    parser.add_address(options);
                    parser.end_group();
                    continue;
                }
                _ => (),
            }

            if parser.is_escaped {
                parser.is_escaped = false;
            }

            if parser.is_token_start {
                parser.is_token_start = false;
            }

            if parser.token_start == 0 {
                parser.token_start = self.offset();
                parser.token_end = parser.token_start;
            } else {
                parser.token_end = self.offset();
            }
        }

        parser.add_token(self, false);
        parser.add_address(options);
        parser.end_group();

        if !parser.result.is_empty() {
            HeaderValue::Address(parser.result)
        } else {
            HeaderValue::Empty
        }
    }
}

fn concat_tokens<'x>(tokens: &mut Vec<Cow<'x, str>>) -> Cow<'x, str> {
    if tokens.len() == 1 {
        tokens.pop().unwrap()
    } else {
        let result = tokens.concat();
        tokens.clear();
        result.into()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        core::{
            address::{Address, AddressList},
            header::HeaderValue,
            options::{ParserOptions, Warning},
        },
        parsers::MessageStream,
    };

    fn parse(input: &str, options: &ParserOptions) -> AddressList<'static> {
        match MessageStream::new(input.as_bytes()).parse_address(options) {
            HeaderValue::Address(list) => list.into_owned(),
            HeaderValue::Empty => AddressList::new(),
            other => panic!("unexpected value for {input:?}: {other:?}"),
        }
    }

    fn mailboxes(list: &AddressList<'_>) -> Vec<(Option<String>, String)> {
        list.mailboxes()
            .map(|mailbox| {
                (
                    mailbox.name.as_ref().map(|name| name.to_string()),
                    mailbox.address.to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn parse_mailboxes() {
        let options = ParserOptions::default();
        for (input, expected) in [
            (
                "jdoe@example.org\n",
                vec![(None, "jdoe@example.org")],
            ),
            (
                "John Doe <jdoe@machine.example>\n",
                vec![(Some("John Doe"), "jdoe@machine.example")],
            ),
            (
                "\"Doe, John\" <jdoe@x.org>, ext@y.org\n",
                vec![(Some("Doe, John"), "jdoe@x.org"), (None, "ext@y.org")],
            ),
            (
                "=?utf-8?q?Andr=C3=A9?= Pirard <PIRARD@vm1.ulg.ac.be>\n",
                vec![(Some("André Pirard"), "PIRARD@vm1.ulg.ac.be")],
            ),
            (
                "Pete(A nice \\) chap) <pete@silly.test>\n",
                vec![(Some("Pete (A nice ) chap)"), "pete@silly.test")],
            ),
            (
                "jdoe@one.example, jqp@two.example,\n  third@three.example\n",
                vec![
                    (None, "jdoe@one.example"),
                    (None, "jqp@two.example"),
                    (None, "third@three.example"),
                ],
            ),
            // RFC 7103: missing angle brackets, @ in display name
            (
                "Joe Smith jsmith@example.com\n",
                vec![(Some("Joe Smith"), "jsmith@example.com")],
            ),
        ] {
            assert_eq!(
                mailboxes(&parse(input, &options)),
                expected
                    .into_iter()
                    .map(|(name, addr)| (name.map(String::from), String::from(addr)))
                    .collect::<Vec<_>>(),
                "failed for {input:?}"
            );
        }
    }

    #[test]
    fn parse_groups() {
        let options = ParserOptions::default();
        let list = parse(
            "A Group:Ed Jones <c@a.test>,joe@where.test;, solo@x.org\n",
            &options,
        );

        assert_eq!(list.len(), 2);
        match list.get(0).unwrap() {
            Address::Group(group) => {
                assert_eq!(group.name.as_deref(), Some("A Group"));
                assert_eq!(group.members.len(), 2);
            }
            other => panic!("expected group, got {other:?}"),
        }
        assert_eq!(
            list.get(1).unwrap().mailbox().unwrap().address,
            "solo@x.org"
        );

        let list = parse("Undisclosed recipients:;\n", &options);
        match list.get(0).unwrap() {
            Address::Group(group) => {
                assert_eq!(group.name.as_deref(), Some("Undisclosed recipients"));
                assert!(group.members.is_empty());
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn bare_local_part_honors_tolerance_setting() {
        let drop_options = ParserOptions::default();
        let list = parse("good@x.org, invalid-just-a-local, ext@y.org\n", &drop_options);
        assert_eq!(
            mailboxes(&list)
                .into_iter()
                .map(|(_, addr)| addr)
                .collect::<Vec<_>>(),
            ["good@x.org", "ext@y.org"]
        );

        let keep_options = ParserOptions {
            allow_addresses_without_domain: true,
            ..Default::default()
        };
        let list = parse("good@x.org, invalid-just-a-local, ext@y.org\n", &keep_options);
        assert_eq!(list.len(), 3);
        let bare = list.get(1).unwrap().mailbox().unwrap();
        assert_eq!(bare.address, "invalid-just-a-local");
        assert_eq!(bare.at_index, None);
    }

    #[test]
    fn strict_mode_drops_defects_with_offset() {
        use std::{cell::RefCell, rc::Rc};

        let warnings = Rc::new(RefCell::new(Vec::new()));
        let warnings_clone = warnings.clone();
        let options = ParserOptions::strict()
            .with_warnings(move |offset, code, _| warnings_clone.borrow_mut().push((offset, code)));

        let input = "\"Doe, John\" <jdoe@x.org>, invalid-just-a-local, ext@y.org\n";
        let list = parse(input, &options);
        assert_eq!(list.len(), 2);

        let warnings = warnings.borrow();
        assert_eq!(warnings.len(), 1);
        let (offset, code) = warnings[0];
        assert_eq!(code, Warning::InvalidAddressList);
        assert_eq!(offset, input.find("invalid").unwrap() as i64);
    }
}
