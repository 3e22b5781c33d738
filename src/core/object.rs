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
    codecs::Encoding,
    core::{
        content_type::{ContentDisposition, ContentType},
        header::{Header, HeaderList, HeaderName},
        message::Message,
        multipart::{generate_boundary, Multipart, SystemRandom},
        options::{FormatOptions, ParserOptions},
        part::DataWrapper,
    },
    stream::{Stream, StreamResult},
};

/// The concrete shape a content type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartClass {
    Part,
    Multipart,
    Message,
}

/// Maps `(type, subtype)` patterns to part classes, `*` matching any
/// token. Lookup precedence: exact, subtype wildcard, type wildcard,
/// then the catch-all.
#[derive(Debug, Clone)]
pub struct PartRegistry {
    entries: Vec<(String, String, PartClass)>,
}

impl Default for PartRegistry {
    fn default() -> Self {
        let mut registry = PartRegistry::empty();
        registry.register("multipart", "*", PartClass::Multipart);
        registry.register("message", "rfc822", PartClass::Message);
        registry.register("message", "global", PartClass::Message);
        registry
    }
}

impl PartRegistry {
    pub fn empty() -> Self {
        PartRegistry {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, c_type: &str, c_subtype: &str, class: PartClass) {
        self.entries.push((
            c_type.to_ascii_lowercase(),
            c_subtype.to_ascii_lowercase(),
            class,
        ));
    }

    pub fn classify(&self, content_type: &ContentType<'_>) -> PartClass {
        let matches = |pattern: &(String, String, PartClass), c_type: &str, c_subtype: &str| {
            (pattern.0 == c_type) && (pattern.1 == c_subtype)
        };
        let c_type = content_type.c_type.to_ascii_lowercase();
        let c_subtype = content_type.c_subtype.to_ascii_lowercase();

        for (find_type, find_subtype) in [
            (c_type.as_str(), c_subtype.as_str()),
            (c_type.as_str(), "*"),
            ("*", c_subtype.as_str()),
            ("*", "*"),
        ] {
            if let Some(entry) = self
                .entries
                .iter()
                .find(|entry| matches(entry, find_type, find_subtype))
            {
                return entry.2;
            }
        }

        PartClass::Part
    }

    /// Builds the empty instance the parser then populates.
    pub fn construct(&self, content_type: &ContentType<'_>) -> MimeBody {
        match self.classify(content_type) {
            PartClass::Part => MimeBody::Part(DataWrapper::default()),
            PartClass::Multipart => MimeBody::Multipart(Multipart::default()),
            PartClass::Message => MimeBody::Message(Box::default()),
        }
    }
}

/// Body of a MIME entity.
#[derive(Debug, Clone)]
pub enum MimeBody {
    /// Leaf content, transfer-encoded as declared.
    Part(DataWrapper),
    /// Ordered children separated by a boundary.
    Multipart(Multipart),
    /// A nested message/rfc822.
    Message(Box<Message>),
}

impl Default for MimeBody {
    fn default() -> Self {
        MimeBody::Part(DataWrapper::default())
    }
}

#[derive(Debug, Clone)]
struct SyncedField<T> {
    value: T,
    /// Header list version this field was last synchronized at.
    header_version: u64,
    /// Parameter list version at synchronization.
    param_version: u64,
    /// Set when the structured side was handed out mutably.
    dirty: bool,
}

/// A MIME entity: its header list, the structured Content-* fields
/// kept in sync with it, and a body.
///
/// Structured fields are re-parsed when the backing header changed and
/// re-serialized to the header when the structured side changed, gated
/// by version counters so a self-initiated write never loops.
#[derive(Debug, Clone, Default)]
pub struct MimeObject {
    pub headers: HeaderList<'static>,
    pub body: MimeBody,

    content_type: Option<SyncedField<ContentType<'static>>>,
    content_disposition: Option<SyncedField<ContentDisposition<'static>>>,

    /// Byte offsets in the parse source, for error reporting.
    pub offset_header: Option<u64>,
    pub offset_body: Option<u64>,
    pub offset_end: Option<u64>,
}

impl MimeObject {
    pub fn new(content_type: ContentType<'static>, body: MimeBody) -> Self {
        let mut object = MimeObject {
            body,
            ..Default::default()
        };
        object.set_content_type(content_type);
        object
    }

    /// A leaf part holding `bytes` in the given transfer encoding.
    pub fn part(content_type: ContentType<'static>, data: DataWrapper) -> Self {
        let encoding = data.encoding();
        let mut object = MimeObject::new(content_type, MimeBody::Part(data));
        if !matches!(encoding, Encoding::Default) {
            object.headers.set(
                HeaderName::ContentTransferEncoding,
                encoding.as_str().to_string(),
            );
        }
        object
    }

    pub fn multipart(subtype: &str, children: Vec<MimeObject>) -> Self {
        MimeObject::new(
            ContentType::new("multipart".to_string(), subtype.to_string()),
            MimeBody::Multipart(Multipart::new(children)),
        )
    }

    pub fn message(message: Message) -> Self {
        MimeObject::new(
            ContentType::message_rfc822(),
            MimeBody::Message(Box::new(message)),
        )
    }

    /// The effective Content-Type; `application/octet-stream` when the
    /// header is missing or unusable.
    pub fn content_type(&mut self) -> &ContentType<'static> {
        self.sync_content_type();
        &self.content_type.as_ref().unwrap().value
    }

    /// Mutable access; the header is refreshed on the next write.
    pub fn content_type_mut(&mut self) -> &mut ContentType<'static> {
        self.sync_content_type();
        let field = self.content_type.as_mut().unwrap();
        field.dirty = true;
        &mut field.value
    }

    pub fn set_content_type(&mut self, content_type: ContentType<'static>) {
        self.content_type = Some(SyncedField {
            value: content_type,
            header_version: 0,
            param_version: 0,
            dirty: true,
        });
        self.flush_content_type(&FormatOptions::default());
    }

    /// Installs an already-synchronized content type without touching
    /// the header, used by the parser so raw headers survive verbatim.
    pub(crate) fn cache_content_type(&mut self, content_type: ContentType<'static>) {
        self.content_type = Some(SyncedField {
            header_version: self.headers.version(),
            param_version: content_type.params.version(),
            value: content_type,
            dirty: false,
        });
    }

    pub fn content_disposition(&mut self) -> Option<&ContentDisposition<'static>> {
        self.sync_content_disposition();
        self.content_disposition.as_ref().map(|field| &field.value)
    }

    pub fn content_disposition_mut(&mut self) -> Option<&mut ContentDisposition<'static>> {
        self.sync_content_disposition();
        let field = self.content_disposition.as_mut()?;
        field.dirty = true;
        Some(&mut field.value)
    }

    pub fn set_content_disposition(&mut self, disposition: ContentDisposition<'static>) {
        self.content_disposition = Some(SyncedField {
            value: disposition,
            header_version: 0,
            param_version: 0,
            dirty: true,
        });
        self.flush_content_disposition(&FormatOptions::default());
    }

    /// The declared transfer encoding of this entity's content.
    pub fn encoding(&self) -> Encoding {
        self.headers
            .get("Content-Transfer-Encoding")
            .map(|header| Encoding::parse(header.value()))
            .unwrap_or_default()
    }

    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.headers.set(
            HeaderName::ContentTransferEncoding,
            encoding.as_str().to_string(),
        );
        if let MimeBody::Part(data) = &mut self.body {
            data.set_encoding(encoding);
        }
    }

    pub fn content_id(&self) -> Option<String> {
        self.headers
            .get("Content-ID")
            .map(|header| header.parse(&ParserOptions::default()))
            .and_then(|value| value.into_text())
            .map(|id| id.into_owned())
    }

    pub fn set_content_id(&mut self, id: &str) {
        let id = id.trim_start_matches('<').trim_end_matches('>');
        self.headers.set(HeaderName::ContentId, format!("<{id}>"));
    }

    pub fn content_description(&self) -> Option<String> {
        self.headers
            .get("Content-Description")
            .map(|header| header.value().to_string())
    }

    pub fn set_content_description(&mut self, description: &str) {
        self.headers
            .set(HeaderName::ContentDescription, description.to_string());
    }

    pub fn content_location(&self) -> Option<String> {
        self.headers
            .get("Content-Location")
            .map(|header| header.value().to_string())
    }

    pub fn set_content_location(&mut self, location: &str) {
        self.headers
            .set(HeaderName::ContentLocation, location.to_string());
    }

    pub fn content_md5(&self) -> Option<String> {
        self.headers
            .get("Content-MD5")
            .map(|header| header.value().to_string())
    }

    /// Removes a header. Content-Type removal is ignored, an entity
    /// always has a type; removing Content-Disposition also clears the
    /// structured disposition.
    pub fn remove_header(&mut self, name: &str) -> Option<Header<'static>> {
        if name.eq_ignore_ascii_case("Content-Type") {
            return None;
        }
        if name.eq_ignore_ascii_case("Content-Disposition") {
            self.content_disposition = None;
        }
        self.headers.remove(name)
    }

    /// The filename advertised by the disposition or type parameters.
    pub fn attachment_name(&mut self) -> Option<String> {
        if let Some(filename) = self
            .content_disposition()
            .and_then(|cd| cd.params.get("filename"))
        {
            return Some(filename.to_string());
        }
        self.content_type().params.get("name").map(String::from)
    }

    pub fn is_attachment(&mut self) -> bool {
        self.content_disposition()
            .is_some_and(|disposition| disposition.is_attachment())
    }

    fn sync_content_type(&mut self) {
        let header_version = self.headers.version();
        if let Some(field) = &self.content_type {
            if field.header_version == header_version || field.dirty {
                return;
            }
        }

        let value = self
            .headers
            .get("Content-Type")
            .map(|header| header.parse(&ParserOptions::default()))
            .and_then(|value| value.into_content_type())
            .unwrap_or_default();

        self.content_type = Some(SyncedField {
            param_version: value.params.version(),
            value,
            header_version,
            dirty: false,
        });
    }

    fn sync_content_disposition(&mut self) {
        let header_version = self.headers.version();
        if let Some(field) = &self.content_disposition {
            if field.header_version == header_version || field.dirty {
                return;
            }
        }

        self.content_disposition = self
            .headers
            .get("Content-Disposition")
            .map(|header| header.parse(&ParserOptions::default()))
            .and_then(|value| value.into_content_disposition())
            .map(|value| SyncedField {
                param_version: value.params.version(),
                value,
                header_version,
                dirty: false,
            });
    }

    fn flush_content_type(&mut self, options: &FormatOptions) {
        if let Some(field) = &mut self.content_type {
            if field.dirty || field.value.params.version() != field.param_version {
                let mut encoded = String::new();
                field.value.encode(options, true, "Content-Type: ".len(), &mut encoded);
                self.headers.set_raw(HeaderName::ContentType, encoded);
                field.header_version = self.headers.version();
                field.param_version = field.value.params.version();
                field.dirty = false;
            }
        }
    }

    fn flush_content_disposition(&mut self, options: &FormatOptions) {
        if let Some(field) = &mut self.content_disposition {
            if field.dirty || field.value.params.version() != field.param_version {
                let mut encoded = String::new();
                field
                    .value
                    .encode(options, true, "Content-Disposition: ".len(), &mut encoded);
                self.headers
                    .set_raw(HeaderName::ContentDisposition, encoded);
                field.header_version = self.headers.version();
                field.param_version = field.value.params.version();
                field.dirty = false;
            }
        }
    }

    /// Re-derives stale Content-* headers from their structured side.
    pub fn flush_content_headers(&mut self, options: &FormatOptions) {
        if let MimeBody::Multipart(_) = &self.body {
            // a boundary is required before the headers go out
            self.sync_content_type();
            let field = self.content_type.as_mut().unwrap();
            if field.value.boundary().is_none() {
                let boundary = generate_boundary(&SystemRandom);
                field.value.params.set("boundary".to_string(), boundary);
                field.dirty = true;
            }
        }
        self.flush_content_type(options);
        self.flush_content_disposition(options);
    }

    /// Serializes headers, blank line and body.
    pub fn write_to(
        &mut self,
        options: &FormatOptions,
        output: &mut dyn Stream,
    ) -> StreamResult<()> {
        self.write_entity(options, output).map(|_| ())
    }

    /// Serialization worker. Returns whether the entity's output ends
    /// with the newline a following boundary line wants in front of it.
    ///
    /// The source newline preceding a boundary belongs to the delimiter:
    /// leaf bodies have it stripped at parse time (so their parent has
    /// to emit it), while a multipart's own closing line already ends in
    /// one. An epilogue had its delimiter newline stripped as well.
    pub(crate) fn write_entity(
        &mut self,
        options: &FormatOptions,
        output: &mut dyn Stream,
    ) -> StreamResult<bool> {
        self.flush_content_headers(options);
        let newline = options.newline.as_bytes();
        let boundary = self
            .content_type
            .as_ref()
            .and_then(|field| field.value.boundary())
            .unwrap_or_default()
            .to_string();

        if options.include_headers {
            let mut headers = String::new();
            self.headers.write(options, &mut headers);
            write_all(output, headers.as_bytes())?;
            write_all(output, newline)?;
        }

        match &mut self.body {
            MimeBody::Part(data) => {
                let bytes = data.raw()?;
                write_all(output, &bytes)?;
                if options.ensure_newline && !bytes.ends_with(b"\n") {
                    write_all(output, newline)?;
                }
                Ok(false)
            }
            MimeBody::Message(message) => message.root.write_entity(options, output),
            MimeBody::Multipart(multipart) => {
                if let Some(preamble) = &multipart.preamble {
                    write_all(output, preamble)?;
                    write_all(output, newline)?;
                }
                // whether the delimiter newline still has to be written
                let mut owe_newline = false;
                for child in multipart.children.iter_mut() {
                    if owe_newline {
                        write_all(output, newline)?;
                    }
                    write_all(output, b"--")?;
                    write_all(output, boundary.as_bytes())?;
                    write_all(output, newline)?;
                    owe_newline = !child.write_entity(options, output)?;
                }
                if owe_newline {
                    write_all(output, newline)?;
                }
                write_all(output, b"--")?;
                write_all(output, boundary.as_bytes())?;
                write_all(output, b"--")?;
                write_all(output, newline)?;
                match &multipart.epilogue {
                    Some(epilogue) => {
                        write_all(output, epilogue)?;
                        Ok(false)
                    }
                    None => Ok(true),
                }
            }
        }
    }

    /// Serializes into a byte buffer.
    pub fn write_bytes(&mut self, options: &FormatOptions) -> StreamResult<Vec<u8>> {
        let mut sink = crate::stream::MemStream::new();
        self.write_to(options, &mut sink)?;
        Ok(sink.into_inner())
    }

    /// Iterates this entity and all entities below it, document order.
    pub fn walk(&self) -> Vec<&MimeObject> {
        let mut parts = vec![self];
        match &self.body {
            MimeBody::Multipart(multipart) => {
                for child in &multipart.children {
                    parts.extend(child.walk());
                }
            }
            MimeBody::Message(message) => {
                parts.extend(message.root.walk());
            }
            MimeBody::Part(_) => (),
        }
        parts
    }
}

fn write_all(output: &mut dyn Stream, mut bytes: &[u8]) -> StreamResult<()> {
    while !bytes.is_empty() {
        match output.write(bytes)? {
            0 => return Err(crate::stream::StreamError::OutOfBounds),
            n => bytes = &bytes[n..],
        }
    }
    Ok(())
}

/// Process-default part registry.
pub fn default_registry() -> PartRegistry {
    PartRegistry::default()
}
