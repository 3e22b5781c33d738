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
    core::{
        content_type::ContentType,
        header::HeaderValue,
        message::Message,
        multipart::Multipart,
        object::{MimeBody, MimeObject, PartClass, PartRegistry},
        options::{ParserOptions, Warning},
        part::DataWrapper,
    },
    parsers::header::parse_header_block,
    stream::{MemStream, SharedStream, StreamResult},
};

/// Streaming MIME parser: walks a byte stream line by line, descends
/// into multipart boundaries and materializes the part tree. Bodies
/// are captured as substreams of the source and stay encoded until
/// they are read.
///
/// The parser never gives up on malformed input; defects are reported
/// through the warning callback and parsing continues with the best
/// recovery available.
pub struct MimeParser {
    pub options: ParserOptions,
    pub registry: PartRegistry,
}

impl Default for MimeParser {
    fn default() -> Self {
        MimeParser {
            options: ParserOptions::default(),
            registry: PartRegistry::default(),
        }
    }
}

/// How a part's body ended.
#[derive(Debug, Clone, Copy, PartialEq)]
enum BodyEnd {
    Eos,
    /// A boundary line matched at the given depth of the boundary
    /// stack; `closing` for the `--boundary--` form.
    Delimiter { level: usize, closing: bool },
}

struct Line {
    start: u64,
    bytes: Vec<u8>,
    /// 0 at end of stream, 1 for `\n`, 2 for `\r\n`.
    newline_len: u8,
}

impl Line {
    fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64 + self.newline_len as u64
    }
}

/// Pulls lines out of a stream, tracking absolute offsets.
struct LineReader {
    stream: SharedStream,
    chunk: Vec<u8>,
    chunk_pos: usize,
    offset: u64,
    eof: bool,
}

impl LineReader {
    fn new(stream: SharedStream) -> Self {
        LineReader {
            offset: stream.tell(),
            stream,
            chunk: Vec::new(),
            chunk_pos: 0,
            eof: false,
        }
    }

    fn next_line(&mut self) -> StreamResult<Option<Line>> {
        let start = self.offset;
        let mut bytes = Vec::new();

        loop {
            if self.chunk_pos >= self.chunk.len() {
                if self.eof {
                    break;
                }
                let mut buf = [0u8; 4096];
                // read failures surface as end of stream for the part
                // being parsed; the caller records the truncation
                let n = match self.stream.read(&mut buf) {
                    Ok(n) => n,
                    Err(err) => {
                        log::debug!("read error treated as end of stream: {err}");
                        0
                    }
                };
                if n == 0 {
                    self.eof = true;
                    break;
                }
                self.chunk = buf[..n].to_vec();
                self.chunk_pos = 0;
            }

            let rest = &self.chunk[self.chunk_pos..];
            match rest.iter().position(|&ch| ch == b'\n') {
                Some(pos) => {
                    bytes.extend_from_slice(&rest[..pos]);
                    self.chunk_pos += pos + 1;
                    self.offset += (pos + 1) as u64;

                    let newline_len = if bytes.last() == Some(&b'\r') {
                        bytes.pop();
                        2
                    } else {
                        1
                    };
                    return Ok(Some(Line {
                        start,
                        bytes,
                        newline_len,
                    }));
                }
                None => {
                    self.offset += rest.len() as u64;
                    bytes.extend_from_slice(rest);
                    self.chunk_pos = self.chunk.len();
                }
            }
        }

        if bytes.is_empty() && start == self.offset {
            Ok(None)
        } else {
            Ok(Some(Line {
                start,
                bytes,
                newline_len: 0,
            }))
        }
    }
}

/// A candidate line matches a boundary when it is `--` + the exact
/// boundary string, optionally `--` for the closing form, then nothing
/// but trailing LWSP. The innermost boundary wins.
fn match_boundary(line: &[u8], boundaries: &[String]) -> Option<(usize, bool)> {
    let rest = line.strip_prefix(b"--")?;
    for (level, boundary) in boundaries.iter().enumerate().rev() {
        if let Some(tail) = rest.strip_prefix(boundary.as_bytes()) {
            let (closing, tail) = match tail.strip_prefix(b"--") {
                Some(tail) => (true, tail),
                None => (false, tail),
            };
            if tail.iter().all(|&ch| ch == b' ' || ch == b'\t') {
                return Some((level, closing));
            }
        }
    }
    None
}

struct EntityParser<'p> {
    options: &'p ParserOptions,
    registry: &'p PartRegistry,
    reader: LineReader,
    source: SharedStream,
    boundaries: Vec<String>,
}

impl MimeParser {
    pub fn new(options: ParserOptions) -> Self {
        MimeParser {
            options,
            registry: PartRegistry::default(),
        }
    }

    pub fn with_registry(mut self, registry: PartRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Parses a message from a memory buffer.
    pub fn parse_bytes(&self, raw: &[u8]) -> StreamResult<Message> {
        self.parse(SharedStream::new(MemStream::from(raw)))
    }

    /// Parses a message from any stream, starting at its current
    /// position.
    pub fn parse(&self, source: SharedStream) -> StreamResult<Message> {
        let mut parser = EntityParser {
            options: &self.options,
            registry: &self.registry,
            reader: LineReader::new(source.clone()),
            source,
            boundaries: Vec::new(),
        };

        let (root, _) = parser.parse_entity(&ContentType::text_plain())?;
        Ok(Message {
            root,
            options: self.options.clone(),
        })
    }
}

impl<'p> EntityParser<'p> {
    /// Parses one entity: header block, classification, body descent.
    fn parse_entity(
        &mut self,
        default_type: &ContentType<'_>,
    ) -> StreamResult<(MimeObject, BodyEnd)> {
        let offset_header = self.reader.offset;

        // collect the header block up to the blank line; a boundary
        // line in header position ends a degenerate headerless part
        let mut block = Vec::new();
        let mut body_end = BodyEnd::Eos;
        let mut saw_blank = false;
        let mut at_eos = true;
        loop {
            match self.reader.next_line()? {
                Some(line) => {
                    if line.bytes.is_empty() && line.newline_len > 0 {
                        saw_blank = true;
                        at_eos = false;
                        break;
                    }
                    if let Some((level, closing)) = match_boundary(&line.bytes, &self.boundaries) {
                        body_end = BodyEnd::Delimiter { level, closing };
                        at_eos = false;
                        break;
                    }
                    block.extend_from_slice(&line.bytes);
                    block.push(b'\n');
                }
                None => break,
            }
        }

        let headers = parse_header_block(&block, offset_header as i64);
        let offset_body = self.reader.offset;

        if matches!(body_end, BodyEnd::Delimiter { .. }) || (at_eos && !saw_blank) {
            // boundary or end of stream hit before any body
            let mut object = MimeObject::default();
            object.headers = headers;
            object.offset_header = Some(offset_header);
            object.offset_body = Some(offset_body);
            object.offset_end = Some(offset_body);
            let parsed = object
                .headers
                .get("Content-Type")
                .map(|header| header.parse(self.options));
            if let Some(HeaderValue::ContentType(ct)) = parsed {
                object.cache_content_type(ct.into_owned());
            }
            return Ok((object, body_end));
        }

        // classify
        let content_type = match headers.get("Content-Type") {
            Some(header) => match header.parse(self.options) {
                HeaderValue::ContentType(ct) => ct.into_owned(),
                _ => {
                    self.options.warn(
                        header.offset.unwrap_or_default(),
                        Warning::InvalidContentType,
                        header.raw_value().unwrap_or_default(),
                    );
                    ContentType::default()
                }
            },
            None => default_type.clone().into_owned(),
        };

        let class = self.registry.classify(&content_type);
        let mut object = MimeObject::default();
        object.headers = headers;
        object.offset_header = Some(offset_header);
        object.offset_body = Some(offset_body);

        // surface defects in the structured headers while the warning
        // callback still has parse context
        use crate::core::header::HeaderName;
        for header in object.headers.iter() {
            if header.name.is_address_header()
                || matches!(
                    header.name,
                    HeaderName::Date | HeaderName::ResentDate | HeaderName::ContentDisposition
                )
            {
                header.parse(self.options);
            }
        }

        let encoding = object.encoding();

        let end = match class {
            PartClass::Multipart if content_type.boundary().is_some() => {
                let boundary = content_type.boundary().unwrap().to_string();
                self.parse_multipart(&mut object, &content_type, boundary)?
            }
            PartClass::Multipart => {
                // no boundary to descend on, keep the body opaque
                self.options.warn(
                    offset_header as i64,
                    Warning::MissingBoundary,
                    &content_type.to_string(),
                );
                self.parse_leaf(&mut object, encoding)?
            }
            PartClass::Message if encoding.is_identity() => {
                let default = ContentType::text_plain();
                let (child, end) = self.parse_entity(&default)?;
                object.body = MimeBody::Message(Box::new(Message {
                    root: child,
                    options: self.options.clone(),
                }));
                object.offset_end = Some(self.reader.offset);
                end
            }
            _ => self.parse_leaf(&mut object, encoding)?,
        };

        object.cache_content_type(content_type);
        if object.offset_end.is_none() {
            object.offset_end = Some(self.reader.offset);
        }

        Ok((object, end))
    }

    /// Captures a leaf body as a substream up to the next boundary of
    /// the stack, or end of stream.
    fn parse_leaf(
        &mut self,
        object: &mut MimeObject,
        encoding: crate::codecs::Encoding,
    ) -> StreamResult<BodyEnd> {
        let body_start = self.reader.offset;
        let mut body_end_offset = body_start;
        let mut last_newline_len = 0u8;
        let mut end = BodyEnd::Eos;

        loop {
            match self.reader.next_line()? {
                Some(line) => {
                    if let Some((level, closing)) = match_boundary(&line.bytes, &self.boundaries) {
                        // the newline before the delimiter belongs to it
                        body_end_offset = line.start - last_newline_len as u64;
                        end = BodyEnd::Delimiter { level, closing };
                        break;
                    }
                    last_newline_len = line.newline_len;
                    body_end_offset = line.end();
                }
                None => break,
            }
        }

        object.body = MimeBody::Part(DataWrapper::new(
            SharedStream::new(self.source.substream(body_start, Some(body_end_offset))),
            encoding,
        ));
        object.offset_end = Some(body_end_offset);

        if end == BodyEnd::Eos && !self.boundaries.is_empty() {
            self.options.warn(
                body_end_offset as i64,
                Warning::TruncatedPart,
                "end of stream before boundary",
            );
        }

        Ok(end)
    }

    /// Multipart descent: preamble, children separated by the
    /// boundary, epilogue after the closing form.
    fn parse_multipart(
        &mut self,
        object: &mut MimeObject,
        content_type: &ContentType<'_>,
        boundary: String,
    ) -> StreamResult<BodyEnd> {
        self.boundaries.push(boundary);
        let our_level = self.boundaries.len() - 1;

        let child_default = if content_type.is_type("multipart", "digest") {
            ContentType::message_rfc822()
        } else {
            ContentType::text_plain()
        };

        let mut multipart = Multipart::default();
        let mut outer_end = None;

        // preamble: everything before the first boundary line, kept
        // verbatim except for the newline owned by the delimiter
        let mut preamble: Vec<u8> = Vec::new();
        let mut seen_preamble_bytes = false;
        let mut last_newline_len = 0u8;
        let mut opened = false;
        loop {
            match self.reader.next_line()? {
                Some(line) => {
                    if let Some((level, closing)) = match_boundary(&line.bytes, &self.boundaries) {
                        if last_newline_len > 0 {
                            preamble.truncate(preamble.len() - last_newline_len as usize);
                        }
                        if level != our_level {
                            outer_end = Some(BodyEnd::Delimiter { level, closing });
                        } else if closing {
                            // an immediately closed container
                            opened = false;
                        } else {
                            opened = true;
                        }
                        break;
                    }
                    seen_preamble_bytes = true;
                    preamble.extend_from_slice(&line.bytes);
                    match line.newline_len {
                        2 => preamble.extend_from_slice(b"\r\n"),
                        1 => preamble.push(b'\n'),
                        _ => (),
                    }
                    last_newline_len = line.newline_len;
                }
                None => {
                    self.options.warn(
                        self.reader.offset as i64,
                        Warning::MissingEndBoundary,
                        "multipart ended before its first boundary",
                    );
                    outer_end = Some(BodyEnd::Eos);
                    break;
                }
            }
        }
        if seen_preamble_bytes {
            multipart.preamble = Some(preamble);
        }

        // children
        if opened {
            loop {
                let (child, end) = self.parse_entity(&child_default)?;
                multipart.children.push(child);
                match end {
                    BodyEnd::Delimiter { level, closing } if level == our_level => {
                        if closing {
                            break;
                        }
                    }
                    BodyEnd::Delimiter { level, closing } => {
                        // a parent boundary closed us without the end
                        // boundary ever showing up
                        self.options.warn(
                            self.reader.offset as i64,
                            Warning::MissingEndBoundary,
                            "child crossed into the outer boundary",
                        );
                        outer_end = Some(BodyEnd::Delimiter { level, closing });
                        break;
                    }
                    BodyEnd::Eos => {
                        self.options.warn(
                            self.reader.offset as i64,
                            Warning::MissingEndBoundary,
                            "end of stream inside multipart",
                        );
                        outer_end = Some(BodyEnd::Eos);
                        break;
                    }
                }
            }
        }

        // epilogue: runs to the enclosing boundary or end of stream
        let end = match outer_end {
            Some(end) => {
                self.boundaries.pop();
                // translate levels after popping our own entry
                end
            }
            None => {
                self.boundaries.pop();
                let mut epilogue: Vec<u8> = Vec::new();
                let mut seen_epilogue = false;
                let mut last_newline_len = 0u8;
                let end;
                loop {
                    match self.reader.next_line()? {
                        Some(line) => {
                            if let Some((level, closing)) =
                                match_boundary(&line.bytes, &self.boundaries)
                            {
                                if last_newline_len > 0 {
                                    epilogue.truncate(epilogue.len() - last_newline_len as usize);
                                }
                                end = BodyEnd::Delimiter { level, closing };
                                break;
                            }
                            seen_epilogue = true;
                            epilogue.extend_from_slice(&line.bytes);
                            match line.newline_len {
                                2 => epilogue.extend_from_slice(b"\r\n"),
                                1 => epilogue.push(b'\n'),
                                _ => (),
                            }
                            last_newline_len = line.newline_len;
                        }
                        None => {
                            end = BodyEnd::Eos;
                            break;
                        }
                    }
                }
                if seen_epilogue {
                    multipart.epilogue = Some(epilogue);
                }
                end
            }
        };

        object.body = MimeBody::Multipart(multipart);
        object.offset_end = Some(self.reader.offset);
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        core::{
            message::Message,
            object::{MimeBody, MimeObject},
            options::{FormatOptions, ParserOptions, Warning},
        },
        parsers::message::MimeParser,
    };

    fn parse(raw: &[u8]) -> Message {
        MimeParser::default().parse_bytes(raw).unwrap()
    }

    fn body_text(object: &MimeObject) -> String {
        match &object.body {
            MimeBody::Part(data) => String::from_utf8(data.decoded().unwrap()).unwrap(),
            other => panic!("expected leaf part, got {other:?}"),
        }
    }

    const SIMPLE: &[u8] =
        b"From: a@b.c\nTo: d@e.f\nSubject: hi\nDate: Thu, 01 Jan 1970 00:00:00 +0000\n\nhello\n";

    #[test]
    fn parse_simple_text() {
        let message = parse(SIMPLE);
        assert_eq!(message.get_from().first_mailbox().unwrap().address, "a@b.c");
        let to = message.get_to();
        assert_eq!(to.len(), 1);
        assert_eq!(to.first_mailbox().unwrap().address, "d@e.f");
        assert_eq!(message.get_subject().as_deref(), Some("hi"));
        assert_eq!(message.get_date().unwrap().to_timestamp(), 0);
        assert_eq!(body_text(&message.root), "hello\n");
    }

    #[test]
    fn simple_round_trip_is_byte_exact() {
        let mut message = parse(SIMPLE);
        let bytes = message.write_bytes(&FormatOptions::default()).unwrap();
        assert_eq!(bytes, SIMPLE);
    }

    #[test]
    fn parse_multipart() {
        let raw = concat!(
            "From: a@b.c\n",
            "Content-Type: multipart/mixed; boundary=\"outer\"\n",
            "\n",
            "This is the preamble.\n",
            "--outer\n",
            "Content-Type: text/plain\n",
            "\n",
            "part one\n",
            "--outer\n",
            "Content-Type: application/octet-stream\n",
            "Content-Transfer-Encoding: base64\n",
            "\n",
            "aGVsbG8=\n",
            "--outer--\n",
            "This is the epilogue.\n"
        );
        let message = parse(raw.as_bytes());

        let MimeBody::Multipart(multipart) = &message.root.body else {
            panic!("expected multipart root");
        };
        assert_eq!(multipart.children.len(), 2);
        assert_eq!(
            multipart.preamble.as_deref(),
            Some(&b"This is the preamble."[..])
        );
        assert_eq!(
            multipart.epilogue.as_deref(),
            Some(&b"This is the epilogue.\n"[..])
        );
        assert_eq!(body_text(&multipart.children[0]), "part one");
        match &multipart.children[1].body {
            MimeBody::Part(data) => {
                assert_eq!(data.decoded().unwrap(), b"hello");
                assert_eq!(data.raw().unwrap(), b"aGVsbG8=");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn multipart_round_trip_is_byte_exact() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"b\"\n",
            "\n",
            "pre\n",
            "--b\n",
            "Content-Type: text/plain\n",
            "\n",
            "one\n",
            "--b\n",
            "Content-Type: text/plain\n",
            "\n",
            "two\n",
            "--b--\n",
            "epilogue\n"
        );
        let mut message = parse(raw.as_bytes());
        let bytes = message.write_bytes(&FormatOptions::default()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), raw);
    }

    #[test]
    fn nested_multipart_depth_two() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"outer\"\n",
            "\n",
            "--outer\n",
            "Content-Type: multipart/alternative; boundary=\"inner\"\n",
            "\n",
            "--inner\n",
            "Content-Type: text/plain\n",
            "\n",
            "plain text\n",
            "--inner\n",
            "Content-Type: text/html\n",
            "\n",
            "<p>html</p>\n",
            "--inner--\n",
            "--outer\n",
            "Content-Type: application/pdf\n",
            "\n",
            "%PDF-1.4\n",
            "--outer--\n"
        );
        let message = parse(raw.as_bytes());

        // document order: root, alternative, two texts, one attachment
        let parts = message.parts();
        assert_eq!(parts.len(), 5);
        assert_eq!(message.attachments().len(), 3);
        assert_eq!(body_text(parts[2]), "plain text");
        assert_eq!(body_text(parts[3]), "<p>html</p>");
        assert_eq!(body_text(parts[4]), "%PDF-1.4");

        // each leaf body reads exactly the source octets
        let pdf = parts[4];
        let start = pdf.offset_body.unwrap() as usize;
        let end = pdf.offset_end.unwrap() as usize;
        assert_eq!(&raw.as_bytes()[start..end], b"%PDF-1.4");
    }

    #[test]
    fn nested_message_rfc822() {
        let raw = concat!(
            "Subject: outer\n",
            "Content-Type: message/rfc822\n",
            "\n",
            "Subject: inner\n",
            "\n",
            "nested body\n"
        );
        let message = parse(raw.as_bytes());
        let MimeBody::Message(inner) = &message.root.body else {
            panic!("expected nested message");
        };
        assert_eq!(inner.get_subject().as_deref(), Some("inner"));
        assert_eq!(body_text(&inner.root), "nested body\n");
    }

    #[test]
    fn digest_defaults_children_to_message() {
        let raw = concat!(
            "Content-Type: multipart/digest; boundary=\"d\"\n",
            "\n",
            "--d\n",
            "\n",
            "Subject: digested\n",
            "\n",
            "digest body\n",
            "--d--\n"
        );
        let message = parse(raw.as_bytes());
        let MimeBody::Multipart(multipart) = &message.root.body else {
            panic!("expected multipart root");
        };
        match &multipart.children[0].body {
            MimeBody::Message(inner) => {
                assert_eq!(inner.get_subject().as_deref(), Some("digested"));
            }
            other => panic!("expected message child, got {other:?}"),
        }
    }

    #[test]
    fn missing_end_boundary_is_recovered() {
        use std::{cell::RefCell, rc::Rc};

        let warnings = Rc::new(RefCell::new(Vec::new()));
        let warnings_clone = warnings.clone();
        let parser = MimeParser::new(
            ParserOptions::default()
                .with_warnings(move |_, code, _| warnings_clone.borrow_mut().push(code)),
        );

        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"b\"\n",
            "\n",
            "--b\n",
            "Content-Type: text/plain\n",
            "\n",
            "truncated part"
        );
        let message = parser.parse_bytes(raw.as_bytes()).unwrap();
        let MimeBody::Multipart(multipart) = &message.root.body else {
            panic!("expected multipart root");
        };
        assert_eq!(multipart.children.len(), 1);
        assert_eq!(body_text(&multipart.children[0]), "truncated part");
        assert!(warnings.borrow().contains(&Warning::TruncatedPart));
        assert!(warnings.borrow().contains(&Warning::MissingEndBoundary));
    }

    #[test]
    fn offsets_travel_with_parts() {
        let message = parse(SIMPLE);
        assert_eq!(message.root.offset_header, Some(0));
        let body_start = SIMPLE.len() - b"hello\n".len();
        assert_eq!(message.root.offset_body, Some(body_start as u64));
        assert_eq!(message.root.offset_end, Some(SIMPLE.len() as u64));

        let from = message.root.headers.get("From").unwrap();
        assert_eq!(from.offset, Some(0));
        let subject = message.root.headers.get("Subject").unwrap();
        assert_eq!(
            subject.offset,
            Some(SIMPLE.iter().position(|&b| b == b'S').unwrap() as i64)
        );
    }

    #[test]
    fn boundary_with_trailing_whitespace() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=x\n",
            "\n",
            "--x \n",
            "\n",
            "a\n",
            "--x\t\n",
            "\n",
            "b\n",
            "--x-- \n"
        );
        let message = parse(raw.as_bytes());
        let MimeBody::Multipart(multipart) = &message.root.body else {
            panic!("expected multipart root");
        };
        assert_eq!(multipart.children.len(), 2);
        assert_eq!(body_text(&multipart.children[0]), "a");
        assert_eq!(body_text(&multipart.children[1]), "b");
    }

    #[test]
    fn empty_input_yields_no_message() {
        assert!(Message::parse(b"").is_none());
        assert!(Message::parse(b"no colon line only").is_none());
    }
}
