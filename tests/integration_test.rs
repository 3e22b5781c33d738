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

use mail_mime::{
    Codec, Encoding, FormatOptions, Message, MimeBody, MimeParser, ParserOptions, Warning,
};

#[test]
fn simple_text_message() {
    let input = concat!(
        "From: a@b.c\n",
        "To: d@e.f\n",
        "Subject: hi\n",
        "Date: Thu, 01 Jan 1970 00:00:00 +0000\n",
        "\n",
        "hello\n"
    );

    let mut message = Message::parse(input.as_bytes()).unwrap();

    assert_eq!(message.get_from().first_mailbox().unwrap().address, "a@b.c");
    let to = message.get_to();
    assert_eq!(to.len(), 1);
    assert_eq!(to.first_mailbox().unwrap().address, "d@e.f");
    assert_eq!(message.get_subject().as_deref(), Some("hi"));

    let date = message.get_date().unwrap();
    assert_eq!(date.to_timestamp(), 0);
    assert_eq!(date.tz_offset_minutes(), 0);

    match &message.root.body {
        MimeBody::Part(data) => assert_eq!(data.decoded().unwrap(), b"hello\n"),
        other => panic!("unexpected body: {other:?}"),
    }

    // serialize(parse(s)) must be byte-for-byte identical
    let output = message.write_bytes(&FormatOptions::default()).unwrap();
    assert_eq!(output, input.as_bytes());
}

#[test]
fn encoded_word_subject() {
    let input = "Subject: =?utf-8?B?w6Vvw4Q=?=\n\n";
    let message = Message::parse(input.as_bytes()).unwrap();
    assert_eq!(message.get_subject().as_deref(), Some("åoÄ"));

    // re-serializing after a mutation produces an encoded word that
    // decodes back to the same text
    let mut rewritten = Message::new();
    rewritten.set_subject("åoÄ");
    let bytes = rewritten.write_bytes(&FormatOptions::default()).unwrap();
    let reparsed = Message::parse(&bytes).unwrap();
    assert_eq!(reparsed.get_subject().as_deref(), Some("åoÄ"));
}

#[test]
fn rfc2231_continuation_filename() {
    let input = concat!(
        "Content-Type: application/octet-stream\n",
        "Content-Disposition: attachment;\n",
        " filename*0*=UTF-8''%e4%b8%ad;\n",
        " filename*1*=%e6%96%87.txt\n",
        "\n",
        "payload\n"
    );
    let mut message = Message::parse(input.as_bytes()).unwrap();

    let disposition = message.root.content_disposition().unwrap();
    assert!(disposition.is_attachment());
    assert_eq!(disposition.filename(), Some("中文.txt"));
    assert_eq!(message.root.attachment_name().as_deref(), Some("中文.txt"));

    // re-encode and make sure the parameter survives another pass
    let bytes = message.write_bytes(&FormatOptions::default()).unwrap();
    let mut reparsed = Message::parse(&bytes).unwrap();
    assert_eq!(
        reparsed.root.content_disposition().unwrap().filename(),
        Some("中文.txt")
    );
}

#[test]
fn nested_multipart_tree() {
    let input = concat!(
        "From: sender@example.org\n",
        "Content-Type: multipart/mixed; boundary=\"mixed\"\n",
        "\n",
        "--mixed\n",
        "Content-Type: multipart/alternative; boundary=\"alt\"\n",
        "\n",
        "--alt\n",
        "Content-Type: text/plain\n",
        "\n",
        "plain version\n",
        "--alt\n",
        "Content-Type: text/html\n",
        "\n",
        "<p>html version</p>\n",
        "--alt--\n",
        "--mixed\n",
        "Content-Type: application/pdf\n",
        "Content-Disposition: attachment; filename=doc.pdf\n",
        "\n",
        "%PDF-1.4 fake\n",
        "--mixed--\n"
    );
    let message = Message::parse(input.as_bytes()).unwrap();

    // depth-2 tree, four parts besides the root
    let parts = message.parts();
    assert_eq!(parts.len(), 5);

    // every leaf body substream reads exactly the source octets
    // between its headers and the next boundary
    for part in &parts {
        if let MimeBody::Part(data) = &part.body {
            let start = part.offset_body.unwrap() as usize;
            let end = part.offset_end.unwrap() as usize;
            assert_eq!(data.raw().unwrap(), &input.as_bytes()[start..end]);
        }
    }

    let MimeBody::Multipart(mixed) = &message.root.body else {
        panic!("expected multipart root");
    };
    let MimeBody::Multipart(alt) = &mixed.children[0].body else {
        panic!("expected nested multipart");
    };
    assert_eq!(alt.children.len(), 2);

    // byte-exact round trip of the whole nested structure
    let mut message = message;
    let output = message.write_bytes(&FormatOptions::default()).unwrap();
    assert_eq!(output, input.as_bytes());
}

#[test]
fn tolerant_address_list() {
    let input = "To: \"Doe, John\" <jdoe@x.org>, invalid-just-a-local, ext@y.org\n\n";

    // loose mode with bare local parts allowed: three addresses
    let parser = MimeParser::new(ParserOptions {
        allow_addresses_without_domain: true,
        ..Default::default()
    });
    let message = parser.parse_bytes(input.as_bytes()).unwrap();
    let to = message.get_to();
    let addresses: Vec<_> = to.mailboxes().collect();
    assert_eq!(addresses.len(), 3);
    assert_eq!(addresses[0].name.as_deref(), Some("Doe, John"));
    assert_eq!(addresses[0].address, "jdoe@x.org");
    assert_eq!(addresses[1].address, "invalid-just-a-local");
    assert_eq!(addresses[1].at_index, None);
    assert_eq!(addresses[2].address, "ext@y.org");

    // strict mode: the middle entry is dropped and reported with its
    // byte offset
    let warnings = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let warnings_clone = warnings.clone();
    let parser = MimeParser::new(ParserOptions::strict().with_warnings(move |offset, code, _| {
        warnings_clone.borrow_mut().push((offset, code));
    }));
    let message = parser.parse_bytes(input.as_bytes()).unwrap();
    assert_eq!(message.get_to().mailboxes().count(), 2);
    assert!(warnings
        .borrow()
        .iter()
        .any(|(_, code)| *code == Warning::InvalidAddressList));
}

#[test]
fn base64_codec_byte_by_byte() {
    let mut codec = Codec::encoder(Encoding::Base64);
    let mut encoded = Vec::new();
    for ch in b"Man" {
        codec.step(&[*ch], &mut encoded);
    }
    codec.flush(&[], &mut encoded);
    assert_eq!(encoded, b"TWFu\n");

    let mut codec = Codec::decoder(Encoding::Base64);
    let mut decoded = Vec::new();
    for ch in &encoded {
        codec.step(&[*ch], &mut decoded);
    }
    codec.flush(&[], &mut decoded);
    assert_eq!(decoded, b"Man");
}

#[test]
fn header_names_and_order_survive_round_trips() {
    let input = concat!(
        "Received: from a.example by b.example; Sat, 20 Nov 2021 14:22:01 -0800\n",
        "X-Custom: keep me\n",
        "from: x@y.z\n",
        "Subject: subject text\n",
        "Message-ID: <id-123@example.org>\n",
        "References: <one@x> <two@y>\n",
        "\n",
        "body\n"
    );

    let mut message = Message::parse(input.as_bytes()).unwrap();
    let bytes = message.write_bytes(&FormatOptions::default()).unwrap();
    let reparsed = Message::parse(&bytes).unwrap();

    let names: Vec<String> = message
        .root
        .headers
        .iter()
        .map(|header| header.name.as_str().to_string())
        .collect();
    let reparsed_names: Vec<String> = reparsed
        .root
        .headers
        .iter()
        .map(|header| header.name.as_str().to_string())
        .collect();
    assert_eq!(names, reparsed_names);

    for (a, b) in message.root.headers.iter().zip(reparsed.root.headers.iter()) {
        assert_eq!(a.value(), b.value(), "value changed for {}", a.name);
    }

    // the lowercase raw spelling is preserved too
    assert_eq!(reparsed.root.headers.get("from").unwrap().raw_name(), "from");
}

#[test]
fn wire_output_uses_crlf() {
    let mut message = Message::parse(b"Subject: test\n\nbody\n").unwrap();
    let bytes = message.write_bytes(&FormatOptions::wire()).unwrap();
    assert!(bytes.starts_with(b"Subject: test\r\n\r\n"));
}

#[test]
fn quoted_printable_part_round_trip() {
    let text = "J'interdis aux marchands de vanter trop leurs marchandises. — Antoine de Saint-Exupéry";
    let encoded = mail_mime::codecs::encode(Encoding::QuotedPrintable, text.as_bytes());

    let mut input = Vec::new();
    input.extend_from_slice(
        b"Content-Type: text/plain; charset=utf-8\nContent-Transfer-Encoding: quoted-printable\n\n",
    );
    input.extend_from_slice(&encoded);

    let message = Message::parse(&input).unwrap();
    match &message.root.body {
        MimeBody::Part(data) => {
            assert_eq!(String::from_utf8(data.decoded().unwrap()).unwrap(), text);
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn parameter_round_trip() {
    use mail_mime::{parsers::MessageStream, ContentType};

    for (name, value) in [
        ("charset", "us-ascii"),
        ("name", "two words.txt"),
        ("filename", "中文 document.pdf"),
        ("title", "a rather long título that will not fit on one folded header line because it keeps going on and on"),
    ] {
        let mut ct = ContentType::new("application", "x-stuff");
        ct.params.set(name.to_string(), value.to_string());

        let mut encoded = String::new();
        ct.encode(&FormatOptions::default(), true, 14, &mut encoded);
        encoded.push('\n');

        let reparsed = MessageStream::new(encoded.as_bytes())
            .parse_content_type(&ParserOptions::default())
            .into_content_type()
            .unwrap();
        assert_eq!(
            reparsed.params.get(name),
            Some(value),
            "failed for {name}={value} via {encoded:?}"
        );
    }
}
