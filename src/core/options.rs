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

use std::{collections::HashSet, rc::Rc};

use thiserror::Error;

use crate::decoders::charsets::{CharsetProvider, DefaultCharsets};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compliance {
    Strict,
    #[default]
    Loose,
}

impl Compliance {
    pub fn is_strict(&self) -> bool {
        matches!(self, Compliance::Strict)
    }
}

/// Recoverable parse defect codes reported through the warning callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("invalid content type")]
    InvalidContentType,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("duplicate parameter")]
    DuplicateParameter,
    #[error("conflicting duplicate parameter")]
    ConflictingParameter,
    #[error("invalid address list")]
    InvalidAddressList,
    #[error("malformed date")]
    InvalidDate,
    #[error("invalid encoded word")]
    InvalidEncodedWord,
    #[error("malformed header")]
    InvalidHeader,
    #[error("multipart boundary missing")]
    MissingBoundary,
    #[error("multipart end boundary missing")]
    MissingEndBoundary,
    #[error("part truncated at end of stream")]
    TruncatedPart,
    #[error("transfer encoding ends mid-quantum")]
    TruncatedEncoding,
    #[error("parameter could not be encoded as requested")]
    ParamEncodingFallback,
}

pub type WarningCallback = Rc<dyn Fn(i64, Warning, &str)>;

/// Options threaded through a parse. Compliance modes choose between
/// rejecting defects and recovering from them; the warning callback
/// receives every recovered defect with its byte offset.
#[derive(Clone)]
pub struct ParserOptions {
    pub address_compliance: Compliance,
    pub parameter_compliance: Compliance,
    pub rfc2047_compliance: Compliance,
    pub allow_addresses_without_domain: bool,
    pub charsets: Rc<dyn CharsetProvider>,
    pub warning_callback: Option<WarningCallback>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            address_compliance: Compliance::Loose,
            parameter_compliance: Compliance::Loose,
            rfc2047_compliance: Compliance::Loose,
            allow_addresses_without_domain: false,
            charsets: Rc::new(DefaultCharsets),
            warning_callback: None,
        }
    }
}

impl ParserOptions {
    pub fn strict() -> Self {
        ParserOptions {
            address_compliance: Compliance::Strict,
            parameter_compliance: Compliance::Strict,
            rfc2047_compliance: Compliance::Strict,
            ..Default::default()
        }
    }

    pub fn with_warnings(mut self, callback: impl Fn(i64, Warning, &str) + 'static) -> Self {
        self.warning_callback = Some(Rc::new(callback));
        self
    }

    pub(crate) fn warn(&self, offset: i64, code: Warning, context: &str) {
        log::debug!("parse defect at offset {offset}: {code} ({context})");
        if let Some(callback) = &self.warning_callback {
            callback(offset, code, context);
        }
    }
}

impl std::fmt::Debug for ParserOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserOptions")
            .field("address_compliance", &self.address_compliance)
            .field("parameter_compliance", &self.parameter_compliance)
            .field("rfc2047_compliance", &self.rfc2047_compliance)
            .field(
                "allow_addresses_without_domain",
                &self.allow_addresses_without_domain,
            )
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Newline {
    #[default]
    Lf,
    CrLf,
}

impl Newline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Newline::Lf => "\n",
            Newline::CrLf => "\r\n",
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

/// Preferred encoding for parameters that cannot be written bare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamEncoding {
    #[default]
    Rfc2231,
    Rfc2047,
}

/// Options applied when serializing a message tree back to a stream.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub newline: Newline,
    /// Header names (any case) left out of the output.
    pub hidden_headers: HashSet<String>,
    pub param_encoding: ParamEncoding,
    pub include_headers: bool,
    /// Append a newline to part bodies that do not end in one.
    pub ensure_newline: bool,
    pub max_line_length: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            newline: Newline::Lf,
            hidden_headers: HashSet::new(),
            param_encoding: ParamEncoding::Rfc2231,
            include_headers: true,
            ensure_newline: false,
            max_line_length: 78,
        }
    }
}

impl FormatOptions {
    pub fn wire() -> Self {
        FormatOptions {
            newline: Newline::CrLf,
            ..Default::default()
        }
    }

    pub fn hide_header(&mut self, name: &str) {
        self.hidden_headers.insert(name.to_ascii_lowercase());
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        !self.hidden_headers.is_empty()
            && self.hidden_headers.contains(&name.to_ascii_lowercase())
    }
}
