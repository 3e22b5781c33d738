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

use std::{borrow::Cow, fmt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::core::{options::FormatOptions, params::ParamList};

/// An RFC 2045 Content-Type: `type/subtype` plus parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContentType<'x> {
    #[cfg_attr(feature = "serde", serde(borrow))]
    pub c_type: Cow<'x, str>,
    pub c_subtype: Cow<'x, str>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub params: ParamList<'x>,
}

impl<'x> Default for ContentType<'x> {
    fn default() -> Self {
        ContentType::new("application", "octet-stream")
    }
}

impl<'x> ContentType<'x> {
    pub fn new(c_type: impl Into<Cow<'x, str>>, c_subtype: impl Into<Cow<'x, str>>) -> Self {
        ContentType {
            c_type: c_type.into(),
            c_subtype: c_subtype.into(),
            params: ParamList::new(),
        }
    }

    pub fn text_plain() -> Self {
        ContentType::new("text", "plain")
    }

    pub fn message_rfc822() -> Self {
        ContentType::new("message", "rfc822")
    }

    /// Case-insensitive type/subtype match; `*` is a wildcard on either
    /// side.
    pub fn is_type(&self, c_type: &str, c_subtype: &str) -> bool {
        (c_type == "*" || self.c_type.eq_ignore_ascii_case(c_type))
            && (c_subtype == "*" || self.c_subtype.eq_ignore_ascii_case(c_subtype))
    }

    pub fn is_multipart(&self) -> bool {
        self.c_type.eq_ignore_ascii_case("multipart")
    }

    pub fn is_message(&self) -> bool {
        self.is_type("message", "rfc822") || self.is_type("message", "global")
    }

    pub fn boundary(&self) -> Option<&str> {
        self.params.get("boundary")
    }

    pub fn charset(&self) -> Option<&str> {
        self.params.get("charset")
    }

    pub fn name(&self) -> Option<&str> {
        self.params.get("name")
    }

    pub fn into_owned<'y>(self) -> ContentType<'y> {
        ContentType {
            c_type: self.c_type.into_owned().into(),
            c_subtype: self.c_subtype.into_owned().into(),
            params: self.params.into_owned(),
        }
    }

    /// Serializes `type/subtype` plus the folded parameter list.
    /// `used` is the column where the value begins.
    pub fn encode(&self, options: &FormatOptions, fold: bool, used: usize, output: &mut String) {
        output.push_str(&self.c_type);
        output.push('/');
        output.push_str(&self.c_subtype);
        self.params.encode(
            options,
            fold,
            used + self.c_type.len() + 1 + self.c_subtype.len(),
            output,
        );
    }
}

impl fmt::Display for ContentType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.c_type, self.c_subtype)
    }
}

/// RFC 2183 disposition value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DispositionKind {
    #[default]
    Inline,
    Attachment,
    Other(String),
}

impl DispositionKind {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("inline") {
            DispositionKind::Inline
        } else if value.eq_ignore_ascii_case("attachment") {
            DispositionKind::Attachment
        } else {
            DispositionKind::Other(value.to_ascii_lowercase())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DispositionKind::Inline => "inline",
            DispositionKind::Attachment => "attachment",
            DispositionKind::Other(other) => other,
        }
    }
}

/// An RFC 2183 Content-Disposition header value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContentDisposition<'x> {
    pub disposition: DispositionKind,
    #[cfg_attr(feature = "serde", serde(borrow, default))]
    pub params: ParamList<'x>,
}

impl<'x> ContentDisposition<'x> {
    pub fn new(disposition: DispositionKind) -> Self {
        ContentDisposition {
            disposition,
            params: ParamList::new(),
        }
    }

    pub fn attachment() -> Self {
        ContentDisposition::new(DispositionKind::Attachment)
    }

    pub fn is_attachment(&self) -> bool {
        self.disposition == DispositionKind::Attachment
    }

    pub fn filename(&self) -> Option<&str> {
        self.params.get("filename")
    }

    pub fn into_owned<'y>(self) -> ContentDisposition<'y> {
        ContentDisposition {
            disposition: self.disposition,
            params: self.params.into_owned(),
        }
    }

    pub fn encode(&self, options: &FormatOptions, fold: bool, used: usize, output: &mut String) {
        let value = self.disposition.as_str();
        output.push_str(value);
        self.params.encode(options, fold, used + value.len(), output);
    }
}

impl fmt::Display for ContentDisposition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.disposition.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::options::FormatOptions;

    use super::{ContentDisposition, ContentType, DispositionKind};

    #[test]
    fn wildcard_type_match() {
        let ct = ContentType::new("Text", "HTML");
        assert!(ct.is_type("text", "html"));
        assert!(ct.is_type("*", "html"));
        assert!(ct.is_type("text", "*"));
        assert!(ct.is_type("*", "*"));
        assert!(!ct.is_type("text", "plain"));
        assert!(!ct.is_type("image", "*"));
    }

    #[test]
    fn encode_with_params() {
        let mut ct = ContentType::new("text", "plain");
        ct.params.set("charset", "utf-8");
        let mut output = String::new();
        ct.encode(&FormatOptions::default(), true, 14, &mut output);
        assert_eq!(output, "text/plain; charset=utf-8");
    }

    #[test]
    fn disposition_values() {
        assert_eq!(DispositionKind::parse("Attachment"), DispositionKind::Attachment);
        assert_eq!(DispositionKind::parse("INLINE"), DispositionKind::Inline);
        assert_eq!(
            DispositionKind::parse("x-whatever"),
            DispositionKind::Other("x-whatever".into())
        );

        let mut cd = ContentDisposition::attachment();
        cd.params.set("filename", "report.pdf");
        let mut output = String::new();
        cd.encode(&FormatOptions::default(), true, 21, &mut output);
        assert_eq!(output, "attachment; filename=report.pdf");
    }
}
