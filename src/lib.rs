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

//! # mail-mime
//!
//! _mail-mime_ parses, represents and serializes Internet Message Format
//! (_RFC 5322_) messages carrying MIME content (_RFC 2045 - 2049_). A byte
//! stream goes in and a mutable tree of message and part objects comes
//! out: headers, parameters, addresses, dates and nested substructure are
//! all addressable and editable, and the tree serializes back to a byte
//! stream that round-trips everything that was preserved.
//!
//! The library abides by the Postel's law or
//! [Robustness Principle](https://en.wikipedia.org/wiki/Robustness_principle):
//! parsing makes a best effort on non-conformant input, reporting every
//! recovered defect through a warning callback with its byte offset, and
//! serializing always produces conformant output.
//!
//! - Streaming parser over a byte-stream abstraction with bounded
//!   substreams: part bodies are views of the source, decoded only when
//!   read.
//! - Resumable base64, quoted-printable and uuencode codecs working over
//!   fixed-size chunks.
//! - Full RFC 2047 encoded words and RFC 2231 parameter continuations,
//!   both directions.
//! - Tolerant and strict compliance modes for addresses, parameters and
//!   encoded words.
//!
//! ## Conformed RFCs
//!
//! - [RFC 822 - Standard for ARPA Internet Text Messages](https://datatracker.ietf.org/doc/html/rfc822)
//! - [RFC 5322 - Internet Message Format](https://datatracker.ietf.org/doc/html/rfc5322)
//! - [RFC 2045 - Multipurpose Internet Mail Extensions (MIME) Part One: Format of Internet Message Bodies](https://datatracker.ietf.org/doc/html/rfc2045)
//! - [RFC 2046 - Multipurpose Internet Mail Extensions (MIME) Part Two: Media Types](https://datatracker.ietf.org/doc/html/rfc2046)
//! - [RFC 2047 - MIME (Multipurpose Internet Mail Extensions) Part Three: Message Header Extensions for Non-ASCII Text](https://datatracker.ietf.org/doc/html/rfc2047)
//! - [RFC 2048 - Multipurpose Internet Mail Extensions (MIME) Part Four: Registration Procedures](https://datatracker.ietf.org/doc/html/rfc2048)
//! - [RFC 2049 - Multipurpose Internet Mail Extensions (MIME) Part Five: Conformance Criteria and Examples](https://datatracker.ietf.org/doc/html/rfc2049)
//! - [RFC 2183 - Communicating Presentation Information in Internet Messages: The Content-Disposition Header Field](https://datatracker.ietf.org/doc/html/rfc2183)
//! - [RFC 2231 - MIME Parameter Value and Encoded Word Extensions: Character Sets, Languages, and Continuations](https://datatracker.ietf.org/doc/html/rfc2231)
//! - [RFC 7103 - Advice for Safe Handling of Malformed Messages](https://datatracker.ietf.org/doc/html/rfc7103)
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use mail_mime::{FormatOptions, Message};
//!
//! let input = br#"From: Art Vandelay <art@vandelay.com>
//! To: jane@example.com
//! Subject: =?utf-8?B?4pi6?= Importing
//! Content-Type: multipart/mixed; boundary="festivus"
//!
//! --festivus
//! Content-Type: text/plain; charset="us-ascii"
//!
//! Why not do both?
//! --festivus--
//! "#;
//!
//! let mut message = Message::parse(input).unwrap();
//! assert_eq!(message.get_subject().unwrap(), "☺ Importing");
//! assert_eq!(
//!     message.get_from().first_mailbox().unwrap().address,
//!     "art@vandelay.com"
//! );
//!
//! // mutate and re-serialize
//! message.set_subject("Exporting");
//! let bytes = message.write_bytes(&FormatOptions::default()).unwrap();
//! ```

pub mod codecs;
pub mod core;
pub mod decoders;
pub mod encoders;
pub mod parsers;
pub mod stream;

pub use crate::core::{
    address::{Address, AddressList, Group, IdnProvider, Mailbox},
    content_type::{ContentDisposition, ContentType, DispositionKind},
    crypto::{CryptoContext, CryptoRegistry, DigestAlgo},
    datetime::DateTime,
    events::{EventList, ListenerId},
    header::{Header, HeaderAction, HeaderList, HeaderListChanged, HeaderName, HeaderValue},
    message::Message,
    multipart::{generate_boundary, Multipart, RandomSource, SystemRandom},
    object::{MimeBody, MimeObject, PartClass, PartRegistry},
    options::{Compliance, FormatOptions, Newline, ParamEncoding, ParserOptions, Warning},
    params::{Param, ParamList, ParamMethod},
    part::DataWrapper,
};
pub use crate::codecs::{Codec, Encoding};
pub use crate::decoders::charsets::{best_encoding, is_8bit, CharsetProvider, DefaultCharsets};
pub use crate::parsers::message::MimeParser;
pub use crate::stream::{
    BufferMode, BufferStream, FileStream, MemStream, SharedStream, Stream, StreamError,
    SubStream, Whence,
};
