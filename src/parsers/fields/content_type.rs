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
        content_type::{ContentDisposition, ContentType, DispositionKind},
        header::HeaderValue,
        options::{ParserOptions, Warning},
        params::{Param, ParamList, ParamMethod},
    },
    decoders::hex::decode_hex,
    parsers::MessageStream,
};

#[derive(Clone, Copy, PartialEq, Debug)]
enum ContentState {
    Type,
    SubType,
    AttributeName,
    AttributeValue,
    AttributeQuotedValue,
    Comment,
}

/// One RFC 2231 continuation chunk, kept raw until every chunk of the
/// parameter has been seen.
struct Continuation<'x> {
    name: Cow<'x, str>,
    index: u32,
    encoded: bool,
    data: String,
    charset: Option<Cow<'x, str>>,
    lang: Option<Cow<'x, str>>,
}

struct ContentFieldParser<'x> {
    state: ContentState,
    state_stack: Vec<ContentState>,

    c_type: Option<Cow<'x, str>>,
    c_subtype: Option<Cow<'x, str>>,

    attr_name: Option<Cow<'x, str>>,
    attr_charset: Option<Cow<'x, str>>,
    attr_lang: Option<Cow<'x, str>>,
    attr_index: Option<u32>,

    values: Vec<Cow<'x, str>>,
    params: Vec<Param<'x>>,
    continuations: Vec<Continuation<'x>>,

    token_start: usize,
    token_end: usize,

    is_continuation: bool,
    is_encoded: bool,
    is_escaped: bool,
    is_lower_case: bool,
    is_token_start: bool,
    used_rfc2047: bool,
}

impl<'x> ContentFieldParser<'x> {
    fn new() -> Self {
        ContentFieldParser {
            state: ContentState::Type,
            state_stack: Vec::new(),

            c_type: None,
            c_subtype: None,

            attr_name: None,
            attr_charset: None,
            attr_lang: None,
            attr_index: None,

            values: Vec::new(),
            params: Vec::new(),
            continuations: Vec::new(),

            token_start: 0,
            token_end: 0,

            is_continuation: false,
            is_encoded: false,
            is_escaped: false,
            is_lower_case: true,
            is_token_start: true,
            used_rfc2047: false,
        }
    }

    #[inline(always)]
    fn reset_token(&mut self) {
        self.token_start = 0;
        self.is_token_start = true;
    }

    fn add_atom(&mut self, stream: &MessageStream<'x>) -> bool {
        if self.token_start > 0 {
            let mut atom = String::from_utf8_lossy(
                stream.bytes(self.token_start - 1..self.token_end),
            );

            if !self.is_lower_case {
                atom.to_mut().make_ascii_lowercase();
                self.is_lower_case = true;
            }

            match self.state {
                ContentState::AttributeName => self.attr_name = Some(atom),
                ContentState::Type => self.c_type = Some(atom),
                ContentState::SubType => self.c_subtype = Some(atom),
                _ => unreachable!(),
            }

            self.reset_token();
            true
        } else {
            false
        }
    }

    /// Consumes the `charset'lang'` prefix pieces of an encoded chunk.
    fn add_charset_or_lang(&mut self, stream: &MessageStream<'x>) {
        let piece = if self.token_start > 0 {
            String::from_utf8_lossy(stream.bytes(self.token_start - 1..self.token_end))
        } else {
            "".into()
        };

        if self.attr_charset.is_none() {
            self.attr_charset = Some(piece);
        } else {
            self.attr_lang = Some(piece);
        }

        self.reset_token();
    }

    fn add_value_piece(&mut self, stream: &MessageStream<'x>, to_cur_pos: bool) {
        if self.token_start > 0 {
            let in_quote = self.state == ContentState::AttributeQuotedValue;

            self.values.push(String::from_utf8_lossy(stream.bytes(
                self.token_start - 1..if in_quote && to_cur_pos {
                    stream.offset() - 1
                } else {
                    self.token_end
                },
            )));
            if !in_quote {
                self.values.push(" ".into());
            }

            self.reset_token();
        }
    }

    fn parse_index(&mut self, stream: &MessageStream<'x>) -> bool {
        if self.token_start > 0 {
            self.attr_index = String::from_utf8_lossy(
                stream.bytes(self.token_start - 1..self.token_end),
            )
            .parse()
            .ok();

            self.reset_token();
            true
        } else {
            false
        }
    }

    /// Finishes the parameter in progress.
    fn add_value(&mut self, stream: &MessageStream<'x>, options: &ParserOptions) {
        if self.attr_name.is_none() {
            self.reset_token();
            return;
        }

        let final_piece = if self.token_start > 0 {
            Some(String::from_utf8_lossy(
                stream.bytes(self.token_start - 1..self.token_end),
            ))
        } else {
            None
        };

        if final_piece.is_none() && self.values.is_empty() && !self.is_continuation {
            self.clear_param_state();
            return;
        }

        let value: Cow<'x, str> = match (self.values.is_empty(), final_piece) {
            (true, Some(piece)) => piece,
            (true, None) => "".into(),
            (false, piece) => {
                let mut value: String = self.values.drain(..).collect();
                match piece {
                    Some(piece) => value.push_str(&piece),
                    // drop the separator a partial piece left behind
                    None => {
                        if value.ends_with(' ') {
                            value.pop();
                        }
                    }
                }
                value.into()
            }
        };

        let name = self.attr_name.take().unwrap();

        if self.is_continuation {
            self.continuations.push(Continuation {
                name,
                index: self.attr_index.take().unwrap_or(0),
                encoded: self.is_encoded,
                data: value.into_owned(),
                charset: self.attr_charset.take(),
                lang: self.attr_lang.take(),
            });
        } else {
            let method = if self.used_rfc2047 {
                ParamMethod::Rfc2047
            } else {
                ParamMethod::Default
            };
            self.push_param(
                Param {
                    name,
                    value,
                    charset: None,
                    lang: None,
                    method,
                },
                options,
            );
        }

        self.clear_param_state();
    }

    fn clear_param_state(&mut self) {
        self.attr_name = None;
        self.attr_charset = None;
        self.attr_lang = None;
        self.attr_index = None;
        self.is_continuation = false;
        self.is_encoded = false;
        self.used_rfc2047 = false;
        self.values.clear();
        self.reset_token();
    }

    /// Keeps the first occurrence of a duplicated name; a conflicting
    /// second value is flagged harder than a plain repeat.
    fn push_param(&mut self, param: Param<'x>, options: &ParserOptions) {
        if let Some(existing) = self
            .params
            .iter()
            .find(|existing| existing.name.eq_ignore_ascii_case(&param.name))
        {
            let code = if existing.value == param.value {
                Warning::DuplicateParameter
            } else {
                Warning::ConflictingParameter
            };
            options.warn(0, code, param.name.as_ref());
            return;
        }
        self.params.push(param);
    }

    /// Reassembles continuation chunks: bucket by name, sort by index,
    /// concatenate the raw bytes (percent-decoding the encoded chunks),
    /// then convert from the declared charset once.
    fn merge_continuations(&mut self, options: &ParserOptions) {
        let mut continuations = std::mem::take(&mut self.continuations);
        continuations.sort_by(|a, b| {
            a.name
                .to_ascii_lowercase()
                .cmp(&b.name.to_ascii_lowercase())
                .then(a.index.cmp(&b.index))
        });

        let mut iter = continuations.into_iter().peekable();
        while let Some(first) = iter.next() {
            let mut assembled = Vec::with_capacity(first.data.len());
            let mut charset = first.charset.clone();
            let mut lang = first.lang.clone();
            let name = first.name.clone();

            for chunk in std::iter::once(first)
                .chain(std::iter::from_fn(|| {
                    iter.next_if(|next| next.name.eq_ignore_ascii_case(&name))
                }))
            {
                if charset.is_none() {
                    charset = chunk.charset;
                }
                if lang.is_none() {
                    lang = chunk.lang;
                }
                if chunk.encoded {
                    let (valid, decoded) = decode_hex(chunk.data.as_bytes());
                    if !valid {
                        options.warn(0, Warning::InvalidParameter, &chunk.name);
                    }
                    assembled.extend_from_slice(&decoded);
                } else {
                    assembled.extend_from_slice(chunk.data.as_bytes());
                }
            }

            let value = match charset
                .as_deref()
                .filter(|charset| !charset.is_empty())
                .and_then(|charset| options.charsets.decode(charset, &assembled))
            {
                Some(decoded) => decoded,
                None => match String::from_utf8(assembled) {
                    Ok(value) => value,
                    // not valid UTF-8, last resort is latin1
                    Err(err) => err.as_bytes().iter().map(|&ch| ch as char).collect(),
                },
            };

            self.push_param(
                Param {
                    name,
                    value: value.into(),
                    charset: charset.filter(|charset| !charset.is_empty()),
                    lang: lang.filter(|lang| !lang.is_empty()),
                    method: ParamMethod::Rfc2231,
                },
                options,
            );
        }
    }
}

impl<'x> MessageStream<'x> {
    /// Parses a `type/subtype; params` Content-Type value.
    pub fn parse_content_type(&mut self, options: &ParserOptions) -> HeaderValue<'x> {
        match self.parse_content_field(options) {
            Some(parser) => match (parser.0, parser.1) {
                (Some(c_type), Some(c_subtype)) => HeaderValue::ContentType(ContentType {
                    c_type,
                    c_subtype,
                    params: parser.2,
                }),
                (Some(c_type), None) if c_type.as_ref() == "text" => {
                    // a bare `text` major defaults its subtype
                    options.warn(0, Warning::InvalidContentType, &c_type);
                    HeaderValue::ContentType(ContentType {
                        c_type,
                        c_subtype: "plain".into(),
                        params: parser.2,
                    })
                }
                (Some(c_type), None) => {
                    options.warn(0, Warning::InvalidContentType, &c_type);
                    HeaderValue::ContentType(ContentType {
                        c_type: "application".into(),
                        c_subtype: "octet-stream".into(),
                        params: parser.2,
                    })
                }
                _ => HeaderValue::Empty,
            },
            None => HeaderValue::Empty,
        }
    }

    /// Parses a Content-Disposition value.
    pub fn parse_content_disposition(&mut self, options: &ParserOptions) -> HeaderValue<'x> {
        match self.parse_content_field(options) {
            Some((Some(disposition), _, params)) => {
                HeaderValue::ContentDisposition(ContentDisposition {
                    disposition: DispositionKind::parse(disposition.as_ref()),
                    params,
                })
            }
            _ => HeaderValue::Empty,
        }
    }

    #[allow(clippy::type_complexity)]
    fn parse_content_field(
        &mut self,
        options: &ParserOptions,
    ) -> Option<(Option<Cow<'x, str>>, Option<Cow<'x, str>>, ParamList<'x>)> {
        let mut parser = ContentFieldParser::new();

        loop {
            let Some(ch) = self.next() else {
                // end of input closes the field like a bare newline
                match parser.state {
                    ContentState::Type | ContentState::SubType | ContentState::AttributeName => {
                        parser.add_atom(self);
                    }
                    ContentState::AttributeValue | ContentState::AttributeQuotedValue => {
                        parser.add_value(self, options);
                    }
                    _ => (),
                }
                break;
            };

            match ch {
                b' ' | b'\t' => {
                    if !parser.is_token_start {
                        parser.is_token_start = true;
                    }
                    if let ContentState::AttributeQuotedValue = parser.state {
                        if parser.token_start == 0 {
                            parser.token_start = self.offset();
                            parser.token_end = parser.token_start;
                        } else {
                            parser.token_end = self.offset();
                        }
                    }
                    continue;
                }
                b'A'..=b'Z' => {
                    if parser.is_lower_case {
                        if let ContentState::Type
                        | ContentState::SubType
                        | ContentState::AttributeName = parser.state
                        {
                            parser.is_lower_case = false;
                        }
                    }
                }
                b'\n' => {
                    let next_is_space = self.peek_next_is_space();
                    match parser.state {
                        ContentState::Type
                        | ContentState::AttributeName
                        | ContentState::SubType => {
                            parser.add_atom(self);
                        }
                        ContentState::AttributeValue => {
                            parser.add_value(self, options);
                        }
                        ContentState::AttributeQuotedValue => {
                            if next_is_space {
                                // unfold inside a quoted value, the
                                // continuation whitespace is kept
                                parser.add_value_piece(self, false);
                                continue;
                            } else {
                                parser.add_value(self, options);
                            }
                        }
                        _ => (),
                    }

                    if next_is_space {
                        parser.state = ContentState::AttributeName;
                        self.next();

                        if !parser.is_token_start {
                            parser.is_token_start = true;
                        }
                        continue;
                    } else {
                        break;
                    }
                }
                b'/' if parser.state == ContentState::Type => {
                    parser.add_atom(self);
                    parser.state = ContentState::SubType;
                    continue;
                }
                b';' => match parser.state {
                    ContentState::Type | ContentState::SubType | ContentState::AttributeName => {
                        parser.add_atom(self);
                        parser.state = ContentState::AttributeName;
                        continue;
                    }
                    ContentState::AttributeValue => {
                        if !parser.is_escaped {
                            parser.add_value(self, options);
                            parser.state = ContentState::AttributeName;
                        } else {
                            parser.is_escaped = false;
                        }
                        continue;
                    }
                    _ => (),
                },
                b'*' if parser.state == ContentState::AttributeName => {
                    if !parser.is_continuation {
                        // `name*` opens a continuation or encoded value
                        parser.is_continuation = parser.add_atom(self);
                    } else if !parser.is_encoded {
                        parser.parse_index(self);
                        parser.is_encoded = true;
                    } else {
                        parser.reset_token();
                    }
                    continue;
                }
                b'=' => match parser.state {
                    ContentState::AttributeName => {
                        if !parser.is_continuation {
                            if !parser.add_atom(self) {
                                continue;
                            }
                        } else if !parser.is_encoded {
                            // `name*n=`: literal chunk n, or `name*=`
                            // when no digits followed the first star
                            parser.is_encoded = !parser.parse_index(self);
                        } else {
                            parser.parse_index(self);
                        }
                        parser.state = ContentState::AttributeValue;
                        continue;
                    }
                    ContentState::AttributeValue | ContentState::AttributeQuotedValue
                        if parser.is_token_start && self.peek_char(b'?') =>
                    {
                        self.checkpoint();
                        if let Some(token) = self.decode_rfc2047(options) {
                            parser.add_value_piece(self, false);
                            parser.values.push(token.into());
                            parser.used_rfc2047 = true;
                            continue;
                        }
                        self.restore();
                    }
                    _ => (),
                },
                b'"' => match parser.state {
                    ContentState::AttributeValue => {
                        if !parser.is_token_start {
                            parser.is_token_start = true;
                        }
                        parser.state = ContentState::AttributeQuotedValue;
                        continue;
                    }
                    ContentState::AttributeQuotedValue => {
                        if !parser.is_escaped {
                            parser.add_value(self, options);
                            parser.state = ContentState::AttributeName;
                            continue;
                        } else {
                            parser.is_escaped = false;
                        }
                    }
                    _ => continue,
                },
                b'\\' => match parser.state {
                    ContentState::AttributeQuotedValue | ContentState::AttributeValue => {
                        if !parser.is_escaped {
                            parser.add_value_piece(self, true);
                            parser.is_escaped = true;
                            continue;
                        } else {
                            parser.is_escaped = false;
                        }
                    }
                    ContentState::Comment => parser.is_escaped = !parser.is_escaped,
                    _ => continue,
                },
                b'\''
                    if parser.is_encoded
                        && !parser.is_escaped
                        && parser.attr_lang.is_none()
                        && parser.state == ContentState::AttributeValue =>
                {
                    parser.add_charset_or_lang(self);
                    continue;
                }
                b'(' if parser.state != ContentState::AttributeQuotedValue => {
                    if !parser.is_escaped {
                        match parser.state {
                            ContentState::Type
                            | ContentState::AttributeName
                            | ContentState::SubType => {
                                parser.add_atom(self);
                            }
                            ContentState::AttributeValue => {
                                parser.add_value(self, options);
                            }
                            _ => (),
                        }

                        parser.state_stack.push(parser.state);
                        parser.state = ContentState::Comment;
                    } else {
                        parser.is_escaped = false;
                    }
                    continue;
                }
                b')' if parser.state == ContentState::Comment => {
                    if !parser.is_escaped {
                        parser.state = parser.state_stack.pop().unwrap_or(ContentState::AttributeName);
                        parser.reset_token();
                    } else {
                        parser.is_escaped = false;
                    }
                    continue;
                }
                b'\r' => continue,
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

        if !parser.continuations.is_empty() {
            parser.merge_continuations(options);
        }

        if parser.c_type.is_some() || !parser.params.is_empty() {
            Some((
                parser.c_type,
                parser.c_subtype,
                parser.params.into_iter().collect(),
            ))
        } else {
            None
        }
    }
}
