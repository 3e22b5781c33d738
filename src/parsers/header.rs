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

use crate::core::header::{Header, HeaderList, HeaderName};

impl HeaderName<'static> {
    /// Recognizes a well-known header name via the perfect hash table;
    /// anything else becomes `Other` with its spelling preserved.
    pub fn lookup(name: &str) -> HeaderName<'static> {
        let bytes = name.as_bytes();
        let len = bytes.len();

        if (2..=25).contains(&len) {
            let mut token_hash = len
                + HDR_HASH[bytes[0].to_ascii_lowercase() as usize] as usize
                + HDR_HASH[bytes[len - 1].to_ascii_lowercase() as usize] as usize;
            if len >= 10 {
                token_hash += HDR_HASH[bytes[9].to_ascii_lowercase() as usize] as usize;
            }

            if (4..=72).contains(&token_hash) {
                let token_hash = token_hash - 4;
                if bytes.eq_ignore_ascii_case(HDR_NAMES[token_hash]) {
                    return HDR_MAP[token_hash].clone();
                }
            }
        }

        HeaderName::Other(name.to_string().into())
    }
}

/// Parses a header block (everything up to the blank line, already
/// isolated by the message parser) into a header list. `base_offset`
/// is the absolute offset of the block in the parse source.
pub fn parse_header_block(block: &[u8], base_offset: i64) -> HeaderList<'static> {
    let mut headers = HeaderList::new();
    let mut lines = Vec::new();

    // split into (start, line) pairs, line ends stripped
    let mut start = 0;
    for (pos, &ch) in block.iter().enumerate() {
        if ch == b'\n' {
            let end = if pos > start && block[pos - 1] == b'\r' {
                pos - 1
            } else {
                pos
            };
            lines.push((start, &block[start..end]));
            start = pos + 1;
        }
    }
    if start < block.len() {
        let rest = &block[start..];
        lines.push((start, rest.strip_suffix(b"\r").unwrap_or(rest)));
    }

    let mut current: Option<(usize, &[u8], String)> = None;

    for (line_start, line) in lines {
        if matches!(line.first(), Some(b' ' | b'\t')) {
            // folded continuation
            if let Some((_, _, value)) = &mut current {
                value.push('\n');
                value.push_str(&String::from_utf8_lossy(line));
                continue;
            }
        }

        if let Some(header) = build_header(current.take(), base_offset) {
            headers.append(header);
        }

        if line.is_empty() {
            continue;
        }

        match line.iter().position(|&ch| ch == b':') {
            Some(colon) => {
                current = Some((
                    line_start,
                    &line[..colon],
                    String::from_utf8_lossy(&line[colon + 1..]).into_owned(),
                ));
            }
            None => {
                // no colon: tolerated as a continuation of the previous
                // header when one exists, dropped otherwise
                log::debug!(
                    "malformed header line at offset {}",
                    base_offset + line_start as i64
                );
            }
        }
    }

    if let Some(header) = build_header(current, base_offset) {
        headers.append(header);
    }

    headers
}

fn build_header(
    current: Option<(usize, &[u8], String)>,
    base_offset: i64,
) -> Option<Header<'static>> {
    let (start, raw_name, raw_value) = current?;
    let raw_name = String::from_utf8_lossy(raw_name).into_owned();
    let name = HeaderName::lookup(raw_name.trim_end());

    Some(Header::from_raw(
        name,
        raw_name.into(),
        raw_value.into(),
        base_offset + start as i64,
    ))
}

static HDR_HASH: &[u8] = &[
    73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73,
    73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73,
    73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73,
    73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73,
    73, 0, 20, 5, 0, 0, 25, 0, 5, 20, 73, 25, 25, 30, 10, 10, 5, 73, 0, 0, 15, 73, 73, 73, 73, 20,
    73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73,
    73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73,
    73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73,
    73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73,
    73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73,
    73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73, 73,
];

static HDR_MAP: &[HeaderName<'static>] = &[
    HeaderName::Date,
    HeaderName::MimeVersion, // unused slot
    HeaderName::Sender,
    HeaderName::MimeVersion, // unused slot
    HeaderName::Received,
    HeaderName::MimeVersion, // unused slot
    HeaderName::References,
    HeaderName::MimeVersion, // unused slot
    HeaderName::Cc,
    HeaderName::Comments,
    HeaderName::ResentCc,
    HeaderName::ContentId,
    HeaderName::MimeVersion, // unused slot
    HeaderName::ResentMessageId,
    HeaderName::ReplyTo,
    HeaderName::ResentTo,
    HeaderName::ResentBcc,
    HeaderName::ContentLanguage,
    HeaderName::Subject,
    HeaderName::ResentSender,
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::ResentDate,
    HeaderName::To,
    HeaderName::Bcc,
    HeaderName::MimeVersion, // unused slot
    HeaderName::ContentTransferEncoding,
    HeaderName::ReturnPath,
    HeaderName::ListId,
    HeaderName::Keywords,
    HeaderName::ContentDescription,
    HeaderName::ListOwner,
    HeaderName::MimeVersion, // unused slot
    HeaderName::ContentType,
    HeaderName::MimeVersion, // unused slot
    HeaderName::ListHelp,
    HeaderName::MessageId,
    HeaderName::ContentLocation,
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::ListSubscribe,
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::ListPost,
    HeaderName::MimeVersion, // unused slot
    HeaderName::ResentFrom,
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::ContentDisposition,
    HeaderName::MimeVersion, // unused slot
    HeaderName::InReplyTo,
    HeaderName::ListArchive,
    HeaderName::MimeVersion, // unused slot
    HeaderName::From,
    HeaderName::MimeVersion, // unused slot
    HeaderName::ListUnsubscribe,
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion, // unused slot
    HeaderName::MimeVersion,
];

static HDR_NAMES: &[&[u8]] = &[
    b"date",
    b"",
    b"sender",
    b"",
    b"received",
    b"",
    b"references",
    b"",
    b"cc",
    b"comments",
    b"resent-cc",
    b"content-id",
    b"",
    b"resent-message-id",
    b"reply-to",
    b"resent-to",
    b"resent-bcc",
    b"content-language",
    b"subject",
    b"resent-sender",
    b"",
    b"",
    b"resent-date",
    b"to",
    b"bcc",
    b"",
    b"content-transfer-encoding",
    b"return-path",
    b"list-id",
    b"keywords",
    b"content-description",
    b"list-owner",
    b"",
    b"content-type",
    b"",
    b"list-help",
    b"message-id",
    b"content-location",
    b"",
    b"",
    b"list-subscribe",
    b"",
    b"",
    b"",
    b"",
    b"list-post",
    b"",
    b"resent-from",
    b"",
    b"",
    b"content-disposition",
    b"",
    b"in-reply-to",
    b"list-archive",
    b"",
    b"from",
    b"",
    b"list-unsubscribe",
    b"",
    b"",
    b"",
    b"",
    b"",
    b"",
    b"",
    b"",
    b"",
    b"",
    b"mime-version",
];

#[cfg(test)]
mod tests {
    use crate::core::header::HeaderName;

    use super::parse_header_block;

    #[test]
    fn header_name_lookup() {
        for (input, expected) in [
            ("From", HeaderName::From),
            ("receiVED", HeaderName::Received),
            ("subject", HeaderName::Subject),
            ("MIME-version", HeaderName::MimeVersion),
            ("Content-Transfer-Encoding", HeaderName::ContentTransferEncoding),
            ("X-Custom-Field", HeaderName::Other("X-Custom-Field".into())),
            ("T", HeaderName::Other("T".into())),
        ] {
            assert_eq!(HeaderName::lookup(input), expected, "failed for {input:?}");
        }
    }

    #[test]
    fn parse_block_preserves_raw_forms() {
        let headers = parse_header_block(
            concat!(
                "From: a@b.c\n",
                "subJect : folded\n  value\n",
                "X-Thing:no space\n"
            )
            .as_bytes(),
            100,
        );

        assert_eq!(headers.len(), 3);

        let from = headers.get("from").unwrap();
        assert_eq!(from.raw_name(), "From");
        assert_eq!(from.raw_value(), Some(" a@b.c"));
        assert_eq!(from.offset, Some(100));

        let subject = headers.get("Subject").unwrap();
        assert_eq!(subject.name, HeaderName::Subject);
        assert_eq!(subject.raw_name(), "subJect ");
        assert_eq!(subject.raw_value(), Some(" folded\n  value"));
        assert_eq!(subject.value(), "folded value");

        let thing = headers.get("x-thing").unwrap();
        assert_eq!(thing.raw_value(), Some("no space"));
    }

    #[test]
    fn crlf_line_ends_are_normalized() {
        let headers = parse_header_block(b"To: x@y.z\r\nSubject: hi\r\n", 0);
        assert_eq!(headers.get("To").unwrap().raw_value(), Some(" x@y.z"));
        assert_eq!(headers.get("Subject").unwrap().raw_value(), Some(" hi"));
    }
}
