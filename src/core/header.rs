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

use std::{
    borrow::Cow,
    cell::{Cell, OnceCell},
    collections::HashMap,
    fmt,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        address::{fold_tokens, AddressList},
        content_type::{ContentDisposition, ContentType},
        datetime::DateTime,
        events::EventList,
        options::{FormatOptions, Newline, ParserOptions},
    },
    encoders::encoded_word::encode_unstructured,
    parsers::MessageStream,
};

/// A header field name. Well-known names parse to their canonical
/// variant; everything else is carried verbatim in `Other`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HeaderName<'x> {
    Subject,
    From,
    To,
    Cc,
    Date,
    Bcc,
    ReplyTo,
    Sender,
    Comments,
    InReplyTo,
    Keywords,
    Received,
    MessageId,
    References,
    ReturnPath,
    MimeVersion,
    ContentDescription,
    ContentId,
    ContentLanguage,
    ContentLocation,
    ContentTransferEncoding,
    ContentType,
    ContentDisposition,
    ResentTo,
    ResentFrom,
    ResentBcc,
    ResentCc,
    ResentSender,
    ResentDate,
    ResentMessageId,
    ListArchive,
    ListHelp,
    ListId,
    ListOwner,
    ListPost,
    ListSubscribe,
    ListUnsubscribe,
    #[cfg_attr(feature = "serde", serde(borrow))]
    Other(Cow<'x, str>),
}

impl PartialEq for HeaderName<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Other(a), Self::Other(b)) => a.eq_ignore_ascii_case(b),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl Eq for HeaderName<'_> {}

impl Default for HeaderName<'_> {
    fn default() -> Self {
        HeaderName::Other("".into())
    }
}

impl<'x> HeaderName<'x> {
    pub fn as_str(&self) -> &str {
        match self {
            HeaderName::Subject => "Subject",
            HeaderName::From => "From",
            HeaderName::To => "To",
            HeaderName::Cc => "Cc",
            HeaderName::Date => "Date",
            HeaderName::Bcc => "Bcc",
            HeaderName::ReplyTo => "Reply-To",
            HeaderName::Sender => "Sender",
            HeaderName::Comments => "Comments",
            HeaderName::InReplyTo => "In-Reply-To",
            HeaderName::Keywords => "Keywords",
            HeaderName::Received => "Received",
            HeaderName::MessageId => "Message-ID",
            HeaderName::References => "References",
            HeaderName::ReturnPath => "Return-Path",
            HeaderName::MimeVersion => "MIME-Version",
            HeaderName::ContentDescription => "Content-Description",
            HeaderName::ContentId => "Content-ID",
            HeaderName::ContentLanguage => "Content-Language",
            HeaderName::ContentLocation => "Content-Location",
            HeaderName::ContentTransferEncoding => "Content-Transfer-Encoding",
            HeaderName::ContentType => "Content-Type",
            HeaderName::ContentDisposition => "Content-Disposition",
            HeaderName::ResentTo => "Resent-To",
            HeaderName::ResentFrom => "Resent-From",
            HeaderName::ResentBcc => "Resent-Bcc",
            HeaderName::ResentCc => "Resent-Cc",
            HeaderName::ResentSender => "Resent-Sender",
            HeaderName::ResentDate => "Resent-Date",
            HeaderName::ResentMessageId => "Resent-Message-ID",
            HeaderName::ListArchive => "List-Archive",
            HeaderName::ListHelp => "List-Help",
            HeaderName::ListId => "List-ID",
            HeaderName::ListOwner => "List-Owner",
            HeaderName::ListPost => "List-Post",
            HeaderName::ListSubscribe => "List-Subscribe",
            HeaderName::ListUnsubscribe => "List-Unsubscribe",
            HeaderName::Other(name) => name.as_ref(),
        }
    }

    /// Returns true if it is a MIME header.
    pub fn is_mime_header(&self) -> bool {
        matches!(
            self,
            HeaderName::ContentDescription
                | HeaderName::ContentId
                | HeaderName::ContentLanguage
                | HeaderName::ContentLocation
                | HeaderName::ContentTransferEncoding
                | HeaderName::ContentType
                | HeaderName::ContentDisposition
        )
    }

    pub fn is_address_header(&self) -> bool {
        matches!(
            self,
            HeaderName::From
                | HeaderName::To
                | HeaderName::Cc
                | HeaderName::Bcc
                | HeaderName::ReplyTo
                | HeaderName::Sender
                | HeaderName::ResentTo
                | HeaderName::ResentFrom
                | HeaderName::ResentBcc
                | HeaderName::ResentCc
                | HeaderName::ResentSender
        ) || matches!(self, HeaderName::Other(name) if name.eq_ignore_ascii_case("Disposition-Notification-To"))
    }

    pub fn into_owned<'y>(self) -> HeaderName<'y> {
        match self {
            HeaderName::Subject => HeaderName::Subject,
            HeaderName::From => HeaderName::From,
            HeaderName::To => HeaderName::To,
            HeaderName::Cc => HeaderName::Cc,
            HeaderName::Date => HeaderName::Date,
            HeaderName::Bcc => HeaderName::Bcc,
            HeaderName::ReplyTo => HeaderName::ReplyTo,
            HeaderName::Sender => HeaderName::Sender,
            HeaderName::Comments => HeaderName::Comments,
            HeaderName::InReplyTo => HeaderName::InReplyTo,
            HeaderName::Keywords => HeaderName::Keywords,
            HeaderName::Received => HeaderName::Received,
            HeaderName::MessageId => HeaderName::MessageId,
            HeaderName::References => HeaderName::References,
            HeaderName::ReturnPath => HeaderName::ReturnPath,
            HeaderName::MimeVersion => HeaderName::MimeVersion,
            HeaderName::ContentDescription => HeaderName::ContentDescription,
            HeaderName::ContentId => HeaderName::ContentId,
            HeaderName::ContentLanguage => HeaderName::ContentLanguage,
            HeaderName::ContentLocation => HeaderName::ContentLocation,
            HeaderName::ContentTransferEncoding => HeaderName::ContentTransferEncoding,
            HeaderName::ContentType => HeaderName::ContentType,
            HeaderName::ContentDisposition => HeaderName::ContentDisposition,
            HeaderName::ResentTo => HeaderName::ResentTo,
            HeaderName::ResentFrom => HeaderName::ResentFrom,
            HeaderName::ResentBcc => HeaderName::ResentBcc,
            HeaderName::ResentCc => HeaderName::ResentCc,
            HeaderName::ResentSender => HeaderName::ResentSender,
            HeaderName::ResentDate => HeaderName::ResentDate,
            HeaderName::ResentMessageId => HeaderName::ResentMessageId,
            HeaderName::ListArchive => HeaderName::ListArchive,
            HeaderName::ListHelp => HeaderName::ListHelp,
            HeaderName::ListId => HeaderName::ListId,
            HeaderName::ListOwner => HeaderName::ListOwner,
            HeaderName::ListPost => HeaderName::ListPost,
            HeaderName::ListSubscribe => HeaderName::ListSubscribe,
            HeaderName::ListUnsubscribe => HeaderName::ListUnsubscribe,
            HeaderName::Other(name) => HeaderName::Other(name.into_owned().into()),
        }
    }
}

impl fmt::Display for HeaderName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed, structured header value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HeaderValue<'x> {
    #[cfg_attr(feature = "serde", serde(borrow))]
    Address(AddressList<'x>),
    Text(Cow<'x, str>),
    TextList(Vec<Cow<'x, str>>),
    DateTime(DateTime),
    ContentType(ContentType<'x>),
    ContentDisposition(ContentDisposition<'x>),
    #[default]
    Empty,
}

impl<'x> HeaderValue<'x> {
    pub fn is_empty(&self) -> bool {
        matches!(self, HeaderValue::Empty)
    }

    pub fn into_text(self) -> Option<Cow<'x, str>> {
        match self {
            HeaderValue::Text(text) => Some(text),
            HeaderValue::TextList(list) => Some(list.join(" ").into()),
            _ => None,
        }
    }

    pub fn into_text_list(self) -> Option<Vec<Cow<'x, str>>> {
        match self {
            HeaderValue::Text(text) => Some(vec![text]),
            HeaderValue::TextList(list) => Some(list),
            _ => None,
        }
    }

    pub fn into_address(self) -> Option<AddressList<'x>> {
        match self {
            HeaderValue::Address(list) => Some(list),
            _ => None,
        }
    }

    pub fn into_datetime(self) -> Option<DateTime> {
        match self {
            HeaderValue::DateTime(datetime) => Some(datetime),
            _ => None,
        }
    }

    pub fn into_content_type(self) -> Option<ContentType<'x>> {
        match self {
            HeaderValue::ContentType(ct) => Some(ct),
            _ => None,
        }
    }

    pub fn into_content_disposition(self) -> Option<ContentDisposition<'x>> {
        match self {
            HeaderValue::ContentDisposition(cd) => Some(cd),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(text) => Some(text.as_ref()),
            HeaderValue::TextList(list) => list.last().map(|text| text.as_ref()),
            _ => None,
        }
    }

    pub fn into_owned<'y>(self) -> HeaderValue<'y> {
        match self {
            HeaderValue::Address(list) => HeaderValue::Address(list.into_owned()),
            HeaderValue::Text(text) => HeaderValue::Text(text.into_owned().into()),
            HeaderValue::TextList(list) => HeaderValue::TextList(
                list.into_iter()
                    .map(|text| text.into_owned().into())
                    .collect(),
            ),
            HeaderValue::DateTime(datetime) => HeaderValue::DateTime(datetime),
            HeaderValue::ContentType(ct) => HeaderValue::ContentType(ct.into_owned()),
            HeaderValue::ContentDisposition(cd) => {
                HeaderValue::ContentDisposition(cd.into_owned())
            }
            HeaderValue::Empty => HeaderValue::Empty,
        }
    }
}

/// A message header. The raw wire form and the decoded value are kept
/// side by side: reading decodes lazily, writing through a setter
/// drops the raw form so the formatter re-derives it on output.
#[derive(Debug, Default)]
pub struct Header<'x> {
    pub name: HeaderName<'x>,
    raw_name: Cow<'x, str>,
    raw_value: Option<Cow<'x, str>>,
    value: OnceCell<String>,
    pub charset: Option<Cow<'x, str>>,
    /// Byte offset of the header in the parse source.
    pub offset: Option<i64>,
}

impl Clone for Header<'_> {
    fn clone(&self) -> Self {
        Header {
            name: self.name.clone(),
            raw_name: self.raw_name.clone(),
            raw_value: self.raw_value.clone(),
            value: self.value.clone(),
            charset: self.charset.clone(),
            offset: self.offset,
        }
    }
}

impl<'x> Header<'x> {
    /// A header with a decoded value; the wire form is derived by the
    /// formatter on write.
    pub fn new(name: HeaderName<'x>, value: impl Into<String>) -> Self {
        Header {
            raw_name: name.as_str().to_string().into(),
            name,
            raw_value: None,
            value: OnceCell::from(value.into()),
            charset: None,
            offset: None,
        }
    }

    /// A header carrying its folded wire form as parsed. `raw_name`
    /// preserves the exact input spelling, trailing whitespace included.
    pub fn from_raw(
        name: HeaderName<'x>,
        raw_name: Cow<'x, str>,
        raw_value: Cow<'x, str>,
        offset: i64,
    ) -> Self {
        Header {
            name,
            raw_name,
            raw_value: Some(raw_value),
            value: OnceCell::new(),
            charset: None,
            offset: Some(offset),
        }
    }

    /// The exact name spelling from the input.
    pub fn raw_name(&self) -> &str {
        self.raw_name.as_ref()
    }

    /// The folded, encoded wire form, when one exists.
    pub fn raw_value(&self) -> Option<&str> {
        self.raw_value.as_deref()
    }

    /// The unfolded, RFC 2047 decoded value, computed on first access.
    pub fn value(&self) -> &str {
        self.value.get_or_init(|| match &self.raw_value {
            Some(raw) => {
                let mut input = Vec::with_capacity(raw.len() + 1);
                input.extend_from_slice(raw.as_bytes());
                input.push(b'\n');
                MessageStream::new(&input)
                    .parse_unstructured(&ParserOptions::default())
                    .into_text()
                    .map(|text| text.into_owned())
                    .unwrap_or_default()
            }
            None => String::new(),
        })
    }

    /// Replaces the decoded value; the wire form is re-derived on the
    /// next write.
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = OnceCell::from(value.into());
        self.raw_value = None;
    }

    /// Replaces the wire form directly.
    pub fn set_raw_value(&mut self, raw_value: impl Into<Cow<'x, str>>) {
        self.raw_value = Some(raw_value.into());
        self.value = OnceCell::new();
        self.offset = None;
    }

    /// True when the wire form must be re-derived on write.
    pub fn needs_reformat(&self) -> bool {
        self.raw_value.is_none()
    }

    /// Parses the value as the structured type its name calls for.
    pub fn parse(&self, options: &ParserOptions) -> HeaderValue<'static> {
        let raw = match &self.raw_value {
            Some(raw) => raw.as_ref(),
            None => self.value.get().map(|v| v.as_str()).unwrap_or(""),
        };
        // the field parsers stop at an unfolded newline
        let mut input = Vec::with_capacity(raw.len() + 1);
        input.extend_from_slice(raw.as_bytes());
        input.push(b'\n');
        let mut stream = MessageStream::new(&input);

        let value = match &self.name {
            name if name.is_address_header() => stream.parse_address(options),
            HeaderName::Date | HeaderName::ResentDate => stream.parse_date(options),
            HeaderName::ContentType => stream.parse_content_type(options),
            HeaderName::ContentDisposition => stream.parse_content_disposition(options),
            HeaderName::MessageId
            | HeaderName::ContentId
            | HeaderName::References
            | HeaderName::InReplyTo
            | HeaderName::ResentMessageId
            | HeaderName::ReturnPath => stream.parse_id(),
            HeaderName::Keywords | HeaderName::ContentLanguage => stream.parse_comma_separated(),
            HeaderName::Received => stream.parse_received(options),
            _ => stream.parse_unstructured(options),
        };
        value.into_owned()
    }

    /// Writes `Name: value` with folding, re-deriving the wire form
    /// through the per-name formatter when needed.
    pub fn write(&self, options: &FormatOptions, output: &mut String) {
        output.push_str(self.raw_name.as_ref());
        output.push(':');

        match &self.raw_value {
            Some(raw) => {
                if !raw.starts_with(' ') && !raw.starts_with('\t') {
                    output.push(' ');
                }
                if options.newline == Newline::CrLf {
                    // normalize fold line ends to CRLF
                    for (pos, line) in raw.split('\n').enumerate() {
                        if pos > 0 {
                            output.push_str("\r\n");
                        }
                        output.push_str(line.strip_suffix('\r').unwrap_or(line));
                    }
                } else {
                    output.push_str(raw);
                }
            }
            None => {
                output.push(' ');
                let used = self.raw_name.len() + 2;
                format_value(
                    &self.name,
                    self.value.get().map(|v| v.as_str()).unwrap_or(""),
                    options,
                    used,
                    output,
                );
            }
        }

        output.push_str(options.newline.as_str());
    }

    pub fn into_owned<'y>(self) -> Header<'y> {
        Header {
            name: self.name.into_owned(),
            raw_name: self.raw_name.into_owned().into(),
            raw_value: self.raw_value.map(|raw| raw.into_owned().into()),
            value: self.value,
            charset: self.charset.map(|charset| charset.into_owned().into()),
            offset: self.offset,
        }
    }
}

/// Per-name value formatter used when a header was set from a decoded
/// value and has to be folded back to the wire.
fn format_value(
    name: &HeaderName<'_>,
    value: &str,
    options: &FormatOptions,
    used: usize,
    output: &mut String,
) {
    let parse_options = ParserOptions::default();
    let mut input = Vec::with_capacity(value.len() + 1);
    input.extend_from_slice(value.as_bytes());
    input.push(b'\n');
    let mut stream = MessageStream::new(&input);

    match name {
        name if name.is_address_header() => {
            if let HeaderValue::Address(list) = stream.parse_address(&parse_options) {
                list.encode(options, used, output);
            }
        }
        HeaderName::MessageId | HeaderName::ContentId | HeaderName::ResentMessageId => {
            if value.starts_with('<') {
                output.push_str(value);
            } else {
                output.push('<');
                output.push_str(value);
                output.push('>');
            }
        }
        HeaderName::References | HeaderName::InReplyTo => match stream.parse_id() {
            HeaderValue::TextList(ids) => {
                let tokens: Vec<String> = ids.iter().map(|id| format!("<{id}>")).collect();
                fold_tokens(&tokens, options, used, output);
            }
            HeaderValue::Text(id) => {
                output.push('<');
                output.push_str(&id);
                output.push('>');
            }
            _ => output.push_str(value),
        },
        HeaderName::Date | HeaderName::ResentDate => match stream.parse_date(&parse_options) {
            HeaderValue::DateTime(datetime) if datetime.is_valid() => {
                output.push_str(&datetime.to_rfc822());
            }
            _ => output.push_str(value),
        },
        HeaderName::ContentType => {
            if let HeaderValue::ContentType(ct) = stream.parse_content_type(&parse_options) {
                ct.encode(options, true, used, output);
            } else {
                output.push_str(value);
            }
        }
        HeaderName::ContentDisposition => {
            if let HeaderValue::ContentDisposition(cd) =
                stream.parse_content_disposition(&parse_options)
            {
                cd.encode(options, true, used, output);
            } else {
                output.push_str(value);
            }
        }
        HeaderName::Received => {
            // fold on token boundaries only, the value is kept verbatim
            let tokens: Vec<String> = value.split_whitespace().map(String::from).collect();
            fold_tokens(&tokens, options, used, output);
        }
        _ => {
            fold_tokens(&encode_unstructured(value), options, used, output);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderAction {
    Added,
    Changed,
    Removed,
    Cleared,
}

/// Payload of a header list change notification.
#[derive(Debug, Clone)]
pub struct HeaderListChanged {
    pub action: HeaderAction,
    pub name: String,
}

/// Insertion-ordered header collection with a case-insensitive index
/// pointing at the earliest header of each name.
#[derive(Debug, Default)]
pub struct HeaderList<'x> {
    headers: Vec<Header<'x>>,
    index: HashMap<String, usize>,
    version: Cell<u64>,
    pub events: EventList<HeaderListChanged>,
}

impl Clone for HeaderList<'_> {
    /// Event listeners do not travel with clones.
    fn clone(&self) -> Self {
        HeaderList {
            headers: self.headers.clone(),
            index: self.index.clone(),
            version: self.version.clone(),
            events: EventList::new(),
        }
    }
}

impl<'x> HeaderList<'x> {
    pub fn new() -> Self {
        HeaderList::default()
    }

    pub fn get(&self, name: &str) -> Option<&Header<'x>> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|&pos| &self.headers[pos])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Header<'x>> {
        let pos = *self.index.get(&name.to_ascii_lowercase())?;
        self.bump();
        self.emit(HeaderAction::Changed, name);
        Some(&mut self.headers[pos])
    }

    pub fn get_all<'y>(&'y self, name: &'y str) -> impl Iterator<Item = &'y Header<'x>> {
        self.headers
            .iter()
            .filter(move |header| header.name.as_str().eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_lowercase())
    }

    /// Replaces the first header of this name, or appends one.
    pub fn set(&mut self, name: HeaderName<'x>, value: impl Into<String>) {
        let key = name.as_str().to_ascii_lowercase();
        match self.index.get(&key) {
            Some(&pos) => {
                self.headers[pos].set_value(value);
                self.bump();
                self.emit(HeaderAction::Changed, &key);
            }
            None => self.append(Header::new(name, value)),
        }
    }

    /// Replaces the first header's wire form, or appends one.
    pub fn set_raw(&mut self, name: HeaderName<'x>, raw_value: impl Into<Cow<'x, str>>) {
        let key = name.as_str().to_ascii_lowercase();
        match self.index.get(&key) {
            Some(&pos) => {
                self.headers[pos].set_raw_value(raw_value);
                self.bump();
                self.emit(HeaderAction::Changed, &key);
            }
            None => {
                let mut header = Header::new(name, "");
                header.set_raw_value(raw_value);
                self.append(header);
            }
        }
    }

    pub fn append(&mut self, header: Header<'x>) {
        let key = header.name.as_str().to_ascii_lowercase();
        let pos = self.headers.len();
        self.headers.push(header);
        self.index.entry(key.clone()).or_insert(pos);
        self.bump();
        self.emit(HeaderAction::Added, &key);
    }

    /// Removes the first header of this name; the index advances to
    /// the next occurrence when one exists.
    pub fn remove(&mut self, name: &str) -> Option<Header<'x>> {
        let key = name.to_ascii_lowercase();
        let pos = *self.index.get(&key)?;
        let header = self.headers.remove(pos);
        self.rebuild_index();
        self.bump();
        self.emit(HeaderAction::Removed, &key);
        Some(header)
    }

    /// Removes every header of this name.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.headers.len();
        self.headers
            .retain(|header| !header.name.as_str().eq_ignore_ascii_case(name));
        let removed = before - self.headers.len();
        if removed > 0 {
            self.rebuild_index();
            self.bump();
            self.emit(HeaderAction::Removed, name);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.headers.clear();
        self.index.clear();
        self.bump();
        self.emit(HeaderAction::Cleared, "");
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header<'x>> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// Serializes every header in insertion order, skipping the hidden
    /// ones.
    pub fn write(&self, options: &FormatOptions, output: &mut String) {
        for header in &self.headers {
            if !options.is_hidden(header.name.as_str()) {
                header.write(options, output);
            }
        }
    }

    pub fn into_owned<'y>(self) -> HeaderList<'y> {
        HeaderList {
            headers: self.headers.into_iter().map(|h| h.into_owned()).collect(),
            index: self.index,
            version: self.version,
            events: EventList::new(),
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (pos, header) in self.headers.iter().enumerate() {
            self.index
                .entry(header.name.as_str().to_ascii_lowercase())
                .or_insert(pos);
        }
    }

    fn bump(&self) {
        self.version.set(self.version.get() + 1);
    }

    fn emit(&self, action: HeaderAction, name: &str) {
        if !self.events.is_empty() {
            self.events.emit(&HeaderListChanged {
                action,
                name: name.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::options::FormatOptions;

    use super::{Header, HeaderAction, HeaderList, HeaderName};

    fn write(header: &Header<'_>) -> String {
        let mut output = String::new();
        header.write(&FormatOptions::default(), &mut output);
        output
    }

    #[test]
    fn raw_value_round_trips_verbatim() {
        let header = Header::from_raw(
            HeaderName::Subject,
            "subJect".into(),
            " =?utf-8?B?w6Vvw4Q=?=".into(),
            0,
        );
        assert_eq!(header.raw_name(), "subJect");
        assert_eq!(header.value(), "åoÄ");
        assert_eq!(write(&header), "subJect: =?utf-8?B?w6Vvw4Q=?=\n");
    }

    #[test]
    fn set_value_triggers_reformat() {
        let mut header =
            Header::from_raw(HeaderName::Subject, "Subject".into(), " hi".into(), 0);
        assert!(!header.needs_reformat());
        header.set_value("hallå");
        assert!(header.needs_reformat());
        assert_eq!(write(&header), "Subject: =?utf-8?B?aGFsbMOl?=\n");
    }

    #[test]
    fn message_id_formatter_adds_brackets() {
        let mut header = Header::new(HeaderName::MessageId, "local-1@example.org");
        assert_eq!(write(&header), "Message-ID: <local-1@example.org>\n");
        header.set_value("<already@bracketed>");
        assert_eq!(write(&header), "Message-ID: <already@bracketed>\n");
    }

    #[test]
    fn index_points_at_earliest_and_advances_on_removal() {
        let mut list = HeaderList::new();
        list.append(Header::from_raw(
            HeaderName::Received,
            "Received".into(),
            " from a".into(),
            0,
        ));
        list.append(Header::from_raw(
            HeaderName::Received,
            "Received".into(),
            " from b".into(),
            20,
        ));

        assert_eq!(list.get("received").unwrap().raw_value(), Some(" from a"));
        assert_eq!(list.get_all("Received").count(), 2);

        list.remove("Received");
        assert_eq!(list.get("RECEIVED").unwrap().raw_value(), Some(" from b"));
        list.remove("received");
        assert!(list.get("Received").is_none());
    }

    #[test]
    fn mutations_emit_events() {
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut list = HeaderList::new();
        let seen_clone = seen.clone();
        list.events.add(move |change: &super::HeaderListChanged| {
            seen_clone
                .borrow_mut()
                .push((change.action, change.name.clone()));
        });

        list.set(HeaderName::Subject, "one");
        list.set(HeaderName::Subject, "two");
        list.remove("subject");

        assert_eq!(
            *seen.borrow(),
            [
                (HeaderAction::Added, "subject".to_string()),
                (HeaderAction::Changed, "subject".to_string()),
                (HeaderAction::Removed, "subject".to_string()),
            ]
        );
    }
}
