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

use std::{borrow::Cow, cell::Cell};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    core::options::{FormatOptions, ParamEncoding},
    decoders::charsets::is_8bit,
    decoders::hex::{encode_hex, is_attr_char},
    encoders::encoded_word::rfc2047_encode,
    parsers::tokens::is_lwsp,
};

const FOLD_LEN: usize = 78;

/// How a parameter was, or should be, written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParamMethod {
    /// Bare `name=value`, chosen automatically when the value allows it.
    #[default]
    Default,
    Rfc2231,
    Rfc2047,
}

/// A Content-Type or Content-Disposition parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Param<'x> {
    #[cfg_attr(feature = "serde", serde(borrow))]
    pub name: Cow<'x, str>,
    pub value: Cow<'x, str>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub charset: Option<Cow<'x, str>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lang: Option<Cow<'x, str>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub method: ParamMethod,
}

impl<'x> Param<'x> {
    pub fn new(name: impl Into<Cow<'x, str>>, value: impl Into<Cow<'x, str>>) -> Self {
        Param {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn into_owned<'y>(self) -> Param<'y> {
        Param {
            name: self.name.into_owned().into(),
            value: self.value.into_owned().into(),
            charset: self.charset.map(|c| c.into_owned().into()),
            lang: self.lang.map(|l| l.into_owned().into()),
            method: self.method,
        }
    }
}

/// Ordered parameter collection with case-insensitive name lookup. The
/// version counter advances on every mutation so owners can tell when
/// their serialized form went stale.
#[derive(Debug, Clone, Default)]
pub struct ParamList<'x> {
    params: Vec<Param<'x>>,
    version: Cell<u64>,
}

impl<'x> PartialEq for ParamList<'x> {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
    }
}

impl<'x> Eq for ParamList<'x> {}

#[cfg(feature = "serde")]
impl<'x> Serialize for ParamList<'x> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.params.serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de: 'x, 'x> Deserialize<'de> for ParamList<'x> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(ParamList {
            params: Vec::deserialize(deserializer)?,
            version: Cell::new(0),
        })
    }
}

impl<'x> ParamList<'x> {
    pub fn new() -> Self {
        ParamList::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|param| param.name.eq_ignore_ascii_case(name))
            .map(|param| param.value.as_ref())
    }

    pub fn get_param(&self, name: &str) -> Option<&Param<'x>> {
        self.params
            .iter()
            .find(|param| param.name.eq_ignore_ascii_case(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.get_param(name).is_some()
    }

    /// Replaces the first parameter of this name or appends a new one.
    pub fn set(&mut self, name: impl Into<Cow<'x, str>>, value: impl Into<Cow<'x, str>>) {
        let name = name.into();
        let value = value.into();
        match self
            .params
            .iter_mut()
            .find(|param| param.name.eq_ignore_ascii_case(&name))
        {
            Some(param) => {
                param.value = value;
                param.charset = None;
                param.lang = None;
            }
            None => self.params.push(Param::new(name, value)),
        }
        self.bump();
    }

    pub fn push(&mut self, param: Param<'x>) {
        self.params.push(param);
        self.bump();
    }

    pub fn remove(&mut self, name: &str) -> Option<Param<'x>> {
        let index = self
            .params
            .iter()
            .position(|param| param.name.eq_ignore_ascii_case(name))?;
        self.bump();
        Some(self.params.remove(index))
    }

    pub fn clear(&mut self) {
        self.params.clear();
        self.bump();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param<'x>> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version.get()
    }

    fn bump(&mut self) {
        self.version.set(self.version.get() + 1);
    }

    pub fn into_owned<'y>(self) -> ParamList<'y> {
        ParamList {
            params: self.params.into_iter().map(|p| p.into_owned()).collect(),
            version: self.version,
        }
    }

    /// Encodes the list as `; name=value` runs, folding lines when
    /// `fold` is set. `used` is the column the output starts at.
    pub fn encode(&self, options: &FormatOptions, fold: bool, mut used: usize, output: &mut String) {
        let newline = options.newline.as_str();

        for param in &self.params {
            if param.value.is_empty() && param.name.is_empty() {
                continue;
            }

            let (value, method) = encode_param(param, options);

            // count the quoting overhead of a bare value
            let quote = match method {
                ParamMethod::Default => value
                    .bytes()
                    .filter(|&ch| !is_attr_char(ch) || is_lwsp(ch))
                    .count()
                    .min(2),
                ParamMethod::Rfc2047 => 2,
                ParamMethod::Rfc2231 => 0,
            };

            let name_len = param.name.len();

            output.push(';');
            used += 1;

            if fold && used + name_len + value.len() + quote + 2 > FOLD_LEN - 1 {
                output.push_str(newline);
                output.push('\t');
                used = 1;
            } else {
                output.push(' ');
                used += 1;
            }

            let too_long = name_len + value.len() + quote > FOLD_LEN - 2;

            if too_long && method == ParamMethod::Rfc2231 {
                // chunked continuation: name*n*=chunk
                let max_chunk = FOLD_LEN.saturating_sub(name_len + 6).max(8);
                let mut rest = value.as_str();
                let mut index = 0;

                while !rest.is_empty() {
                    let mut split = rest.len().min(max_chunk);
                    // never split in the middle of a %XX escape
                    if split < rest.len() {
                        let window = &rest.as_bytes()[split.saturating_sub(2)..split];
                        if let Some(pos) = window.iter().rposition(|&ch| ch == b'%') {
                            split = split.saturating_sub(2) + pos;
                        }
                    }
                    let (chunk, tail) = rest.split_at(split);

                    if index != 0 {
                        output.push(';');
                        if fold {
                            output.push_str(newline);
                            output.push('\t');
                            used = 1;
                        } else {
                            output.push(' ');
                        }
                    }

                    let piece = format!("{}*{}*={}", param.name, index, chunk);
                    used += piece.len();
                    output.push_str(&piece);
                    index += 1;
                    rest = tail;
                }
            } else {
                let encoded = method == ParamMethod::Rfc2231;
                output.push_str(&param.name);
                if encoded {
                    output.push('*');
                }
                output.push('=');
                used += name_len + 1 + usize::from(encoded);

                if quote > 0 {
                    output.push('"');
                    for ch in value.chars() {
                        if ch == '"' || ch == '\\' {
                            output.push('\\');
                        }
                        output.push(ch);
                    }
                    output.push('"');
                    used += value.len() + 2;
                } else {
                    output.push_str(&value);
                    used += value.len();
                }
            }
        }
    }
}

impl<'x> FromIterator<Param<'x>> for ParamList<'x> {
    fn from_iter<T: IntoIterator<Item = Param<'x>>>(iter: T) -> Self {
        ParamList {
            params: iter.into_iter().collect(),
            version: Cell::new(0),
        }
    }
}

/// Chooses the wire form of one parameter value: bare when it is short
/// ASCII, a single RFC 2047 encoded word when the format options ask
/// for it and it fits, percent-encoded RFC 2231 otherwise.
fn encode_param(param: &Param<'_>, options: &FormatOptions) -> (String, ParamMethod) {
    let value = param.value.as_ref();

    if value.len() < FOLD_LEN && value.bytes().all(|ch| (b' '..=b'~').contains(&ch)) {
        return (value.to_string(), ParamMethod::Default);
    }

    let requested = match param.method {
        ParamMethod::Default => match options.param_encoding {
            ParamEncoding::Rfc2231 => ParamMethod::Rfc2231,
            ParamEncoding::Rfc2047 => ParamMethod::Rfc2047,
        },
        method => method,
    };

    if requested == ParamMethod::Rfc2047 {
        let words = rfc2047_encode(value, false);
        if let [word] = words.as_slice() {
            return (word.clone(), ParamMethod::Rfc2047);
        }
        // does not fit a single encoded word, fall back to chunkable 2231
        log::warn!(
            "parameter {} too long for an RFC 2047 encoded word, using RFC 2231",
            param.name
        );
    }

    let charset = match &param.charset {
        Some(charset) => charset.as_ref(),
        None if is_8bit(value.as_bytes()) => "utf-8",
        None => "us-ascii",
    };

    let mut encoded = String::with_capacity(value.len() + 24);
    encoded.push_str(charset);
    encoded.push('\'');
    if let Some(lang) = &param.lang {
        encoded.push_str(lang);
    }
    encoded.push('\'');
    encode_hex(value.as_bytes(), &mut encoded);

    (encoded, ParamMethod::Rfc2231)
}
