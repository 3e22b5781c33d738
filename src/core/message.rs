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
        address::AddressList,
        datetime::DateTime,
        header::{HeaderName, HeaderValue},
        object::{MimeBody, MimeObject},
        options::{FormatOptions, ParserOptions},
    },
    stream::{Stream, StreamResult},
};

/// An RFC 5322 message: a MIME entity whose headers double as the
/// envelope. Each typed accessor reads the backing header, each setter
/// rewrites it, so the header list stays the single source of truth.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub root: MimeObject,
    /// The compliance options this message was parsed with; typed
    /// accessors keep using them.
    pub options: ParserOptions,
}

impl Message {
    pub fn new() -> Self {
        Message::default()
    }

    /// Parses a raw message held in memory with the default options.
    /// Returns `None` when not even one header could be read.
    pub fn parse(raw: &[u8]) -> Option<Message> {
        crate::parsers::message::MimeParser::default()
            .parse_bytes(raw)
            .ok()
            .filter(|message| !message.root.headers.is_empty())
    }

    fn parsed_header(&self, name: &str) -> Option<HeaderValue<'static>> {
        self.root
            .headers
            .get(name)
            .map(|header| header.parse(&self.options))
    }

    fn address_header(&self, name: &str) -> AddressList<'static> {
        self.parsed_header(name)
            .and_then(|value| value.into_address())
            .unwrap_or_default()
    }

    pub fn get_from(&self) -> AddressList<'static> {
        self.address_header("From")
    }

    pub fn get_sender(&self) -> AddressList<'static> {
        self.address_header("Sender")
    }

    pub fn get_reply_to(&self) -> AddressList<'static> {
        self.address_header("Reply-To")
    }

    pub fn get_to(&self) -> AddressList<'static> {
        self.address_header("To")
    }

    pub fn get_cc(&self) -> AddressList<'static> {
        self.address_header("Cc")
    }

    pub fn get_bcc(&self) -> AddressList<'static> {
        self.address_header("Bcc")
    }

    pub fn get_subject(&self) -> Option<String> {
        self.root
            .headers
            .get("Subject")
            .map(|header| header.value().to_string())
    }

    /// The Date header with its zone offset; the epoch when the header
    /// is present but malformed, `None` when absent.
    pub fn get_date(&self) -> Option<DateTime> {
        self.parsed_header("Date")
            .and_then(|value| value.into_datetime())
    }

    pub fn get_message_id(&self) -> Option<String> {
        self.parsed_header("Message-ID")
            .and_then(|value| value.into_text())
            .map(|id| id.into_owned())
    }

    pub fn get_in_reply_to(&self) -> Vec<String> {
        self.parsed_header("In-Reply-To")
            .and_then(|value| value.into_text_list())
            .map(|ids| ids.into_iter().map(|id| id.into_owned()).collect())
            .unwrap_or_default()
    }

    pub fn get_references(&self) -> Vec<String> {
        self.parsed_header("References")
            .and_then(|value| value.into_text_list())
            .map(|ids| ids.into_iter().map(|id| id.into_owned()).collect())
            .unwrap_or_default()
    }

    fn set_address_header(&mut self, name: HeaderName<'static>, list: AddressList<'static>) {
        let mut encoded = String::new();
        list.encode(
            &FormatOptions::default(),
            name.as_str().len() + 2,
            &mut encoded,
        );
        self.root.headers.set_raw(name, encoded);
    }

    pub fn set_from(&mut self, list: impl Into<AddressList<'static>>) {
        self.set_address_header(HeaderName::From, list.into());
    }

    pub fn set_sender(&mut self, list: impl Into<AddressList<'static>>) {
        self.set_address_header(HeaderName::Sender, list.into());
    }

    pub fn set_reply_to(&mut self, list: impl Into<AddressList<'static>>) {
        self.set_address_header(HeaderName::ReplyTo, list.into());
    }

    pub fn set_to(&mut self, list: impl Into<AddressList<'static>>) {
        self.set_address_header(HeaderName::To, list.into());
    }

    pub fn set_cc(&mut self, list: impl Into<AddressList<'static>>) {
        self.set_address_header(HeaderName::Cc, list.into());
    }

    pub fn set_bcc(&mut self, list: impl Into<AddressList<'static>>) {
        self.set_address_header(HeaderName::Bcc, list.into());
    }

    pub fn set_subject(&mut self, subject: &str) {
        self.root.headers.set(HeaderName::Subject, subject.to_string());
    }

    pub fn set_date(&mut self, date: DateTime) {
        self.root.headers.set_raw(HeaderName::Date, date.to_rfc822());
    }

    pub fn set_message_id(&mut self, id: &str) {
        let id = id.trim_start_matches('<').trim_end_matches('>');
        self.root
            .headers
            .set_raw(HeaderName::MessageId, format!("<{id}>"));
    }

    pub fn set_in_reply_to(&mut self, ids: &[&str]) {
        self.root
            .headers
            .set(HeaderName::InReplyTo, ids.join(" "));
    }

    pub fn set_references(&mut self, ids: &[&str]) {
        self.root
            .headers
            .set(HeaderName::References, ids.join(" "));
    }

    /// All parts of this message in document order, the root included.
    pub fn parts(&self) -> Vec<&MimeObject> {
        self.root.walk()
    }

    /// Leaf attachments of this message, skipping containers.
    pub fn attachments(&self) -> Vec<&MimeObject> {
        self.root
            .walk()
            .into_iter()
            .filter(|object| matches!(object.body, MimeBody::Part(_)))
            .collect()
    }

    pub fn write_to(
        &mut self,
        options: &FormatOptions,
        output: &mut dyn Stream,
    ) -> StreamResult<()> {
        self.root.write_to(options, output)
    }

    pub fn write_bytes(&mut self, options: &FormatOptions) -> StreamResult<Vec<u8>> {
        self.root.write_bytes(options)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::{
        address::{AddressList, Mailbox},
        datetime::DateTime,
        message::Message,
        options::FormatOptions,
    };

    #[test]
    fn envelope_setters_keep_headers_in_sync() {
        let mut message = Message::new();
        message.set_from(Mailbox::new(Some("Ann".into()), "ann@example.org"));
        message.set_subject("hallå there");
        message.set_date(DateTime::from_timestamp(1637447521, -480));
        message.set_message_id("id-1@example.org");
        message.set_references(&["<a@x>", "<b@y>"]);

        assert_eq!(
            message.root.headers.get("From").unwrap().raw_value(),
            Some("Ann <ann@example.org>")
        );
        assert_eq!(message.get_subject().as_deref(), Some("hallå there"));
        assert_eq!(message.get_message_id().as_deref(), Some("id-1@example.org"));
        assert_eq!(message.get_references(), ["a@x", "b@y"]);
        assert_eq!(
            message.get_date().unwrap().to_rfc822(),
            "Sat, 20 Nov 2021 14:22:01 -0800"
        );

        let from = message.get_from();
        assert_eq!(from.first_mailbox().unwrap().address, "ann@example.org");

        // replacing the list replaces the header
        let mut list = AddressList::new();
        list.push(Mailbox::new(None, "bob@example.org"));
        message.set_from(list);
        assert_eq!(
            message.root.headers.get("From").unwrap().raw_value(),
            Some("bob@example.org")
        );

        let bytes = message.write_bytes(&FormatOptions::default()).unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("Subject: =?utf-8?B?"));
    }
}
