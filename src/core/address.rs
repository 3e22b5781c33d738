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

use std::{borrow::Cow, cell::Cell, cell::OnceCell, fmt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    core::options::FormatOptions,
    encoders::encoded_word::{encode_phrase, needs_encoding},
    parsers::tokens::is_atom,
};

/// Internationalized domain backend. Only mailboxes consult it; the
/// original addr-spec is always retained.
pub trait IdnProvider {
    fn to_ascii(&self, domain: &str) -> Option<String>;
    fn to_unicode(&self, domain: &str) -> Option<String>;
}

/// A single address with optional display name. The addr-spec is kept
/// in its original, pre-IDN form; the ASCII-compatible form is derived
/// on demand and cached.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mailbox<'x> {
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<Cow<'x, str>>,
    #[cfg_attr(feature = "serde", serde(borrow))]
    pub address: Cow<'x, str>,
    /// Byte offset of the `@` separating local part and domain, `None`
    /// for a bare local part accepted in tolerance mode.
    #[cfg_attr(feature = "serde", serde(default))]
    pub at_index: Option<usize>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub charset: Option<Cow<'x, str>>,
    #[cfg_attr(feature = "serde", serde(skip))]
    idn_cache: OnceCell<String>,
}

impl<'x> PartialEq for Mailbox<'x> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.address == other.address
            && self.at_index == other.at_index
    }
}

impl<'x> Eq for Mailbox<'x> {}

impl<'x> Mailbox<'x> {
    pub fn new(name: Option<Cow<'x, str>>, address: impl Into<Cow<'x, str>>) -> Self {
        let address = address.into();
        Mailbox {
            name,
            at_index: address.rfind('@').filter(|&at| at > 0),
            address,
            charset: None,
            idn_cache: OnceCell::new(),
        }
    }

    pub fn local_part(&self) -> &str {
        match self.at_index {
            Some(at) => &self.address[..at],
            None => &self.address,
        }
    }

    pub fn domain(&self) -> Option<&str> {
        self.at_index.map(|at| &self.address[at + 1..])
    }

    /// The addr-spec with its domain converted to ASCII-compatible
    /// form, computed through `provider` on first use and cached.
    pub fn idn_address(&self, provider: &dyn IdnProvider) -> Option<&str> {
        if let Some(cached) = self.idn_cache.get() {
            return Some(cached);
        }
        let domain = self.domain()?;
        let ascii = if domain.is_ascii() {
            self.address.to_string()
        } else {
            format!("{}@{}", self.local_part(), provider.to_ascii(domain)?)
        };
        Some(self.idn_cache.get_or_init(|| ascii))
    }

    pub fn into_owned<'y>(self) -> Mailbox<'y> {
        Mailbox {
            name: self.name.map(|name| name.into_owned().into()),
            address: self.address.into_owned().into(),
            at_index: self.at_index,
            charset: self.charset.map(|charset| charset.into_owned().into()),
            idn_cache: self.idn_cache,
        }
    }
}

/// A named collection of addresses. Members may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Group<'x> {
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<Cow<'x, str>>,
    #[cfg_attr(feature = "serde", serde(borrow, default))]
    pub members: AddressList<'x>,
}

impl<'x> Group<'x> {
    pub fn new(name: impl Into<Cow<'x, str>>, members: AddressList<'x>) -> Self {
        Group {
            name: Some(name.into()),
            members,
        }
    }

    pub fn into_owned<'y>(self) -> Group<'y> {
        Group {
            name: self.name.map(|name| name.into_owned().into()),
            members: self.members.into_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Address<'x> {
    #[cfg_attr(feature = "serde", serde(borrow))]
    Mailbox(Mailbox<'x>),
    Group(Group<'x>),
}

impl<'x> Address<'x> {
    pub fn mailbox(&self) -> Option<&Mailbox<'x>> {
        match self {
            Address::Mailbox(mailbox) => Some(mailbox),
            Address::Group(_) => None,
        }
    }

    pub fn into_owned<'y>(self) -> Address<'y> {
        match self {
            Address::Mailbox(mailbox) => Address::Mailbox(mailbox.into_owned()),
            Address::Group(group) => Address::Group(group.into_owned()),
        }
    }
}

impl<'x> From<Mailbox<'x>> for Address<'x> {
    fn from(mailbox: Mailbox<'x>) -> Self {
        Address::Mailbox(mailbox)
    }
}

impl<'x> From<Group<'x>> for Address<'x> {
    fn from(group: Group<'x>) -> Self {
        Address::Group(group)
    }
}

/// Ordered address list. The version counter advances on every
/// mutation so owners can re-derive the backing header when stale.
#[derive(Debug, Clone, Default)]
pub struct AddressList<'x> {
    items: Vec<Address<'x>>,
    version: Cell<u64>,
}

impl<'x> PartialEq for AddressList<'x> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<'x> Eq for AddressList<'x> {}

#[cfg(feature = "serde")]
impl<'x> Serialize for AddressList<'x> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de: 'x, 'x> Deserialize<'de> for AddressList<'x> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(AddressList {
            items: Vec::deserialize(deserializer)?,
            version: Cell::new(0),
        })
    }
}

impl<'x> AddressList<'x> {
    pub fn new() -> Self {
        AddressList::default()
    }

    pub fn push(&mut self, address: impl Into<Address<'x>>) {
        self.items.push(address.into());
        self.bump();
    }

    pub fn insert(&mut self, index: usize, address: impl Into<Address<'x>>) {
        self.items.insert(index, address.into());
        self.bump();
    }

    pub fn remove(&mut self, index: usize) -> Address<'x> {
        self.bump();
        self.items.remove(index)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.bump();
    }

    pub fn get(&self, index: usize) -> Option<&Address<'x>> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Address<'x>> {
        self.items.iter()
    }

    /// Iterates every mailbox, descending into groups.
    pub fn mailboxes(&self) -> impl Iterator<Item = &Mailbox<'x>> {
        let mut stack = vec![self.items.iter()];
        std::iter::from_fn(move || loop {
            let iter = stack.last_mut()?;
            match iter.next() {
                Some(Address::Mailbox(mailbox)) => return Some(mailbox),
                Some(Address::Group(group)) => stack.push(group.members.items.iter()),
                None => {
                    stack.pop();
                }
            }
        })
    }

    pub fn first_mailbox(&self) -> Option<&Mailbox<'x>> {
        self.mailboxes().next()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version.get()
    }

    fn bump(&mut self) {
        self.version.set(self.version.get() + 1);
    }

    pub fn into_owned<'y>(self) -> AddressList<'y> {
        AddressList {
            items: self.items.into_iter().map(|a| a.into_owned()).collect(),
            version: self.version,
        }
    }

    /// Serializes the list, RFC 2047 encoding display names and folding
    /// before any token that would cross the soft limit.
    pub fn encode(&self, options: &FormatOptions, used: usize, output: &mut String) {
        let mut tokens = Vec::new();
        for (pos, address) in self.items.iter().enumerate() {
            let last = pos + 1 == self.items.len();
            match address {
                Address::Mailbox(mailbox) => mailbox_tokens(mailbox, !last, &mut tokens),
                Address::Group(group) => {
                    match &group.name {
                        Some(name) => name_tokens(name, &mut tokens),
                        None => tokens.push(String::new()),
                    }
                    match tokens.last_mut() {
                        Some(token) => token.push(':'),
                        None => tokens.push(":".to_string()),
                    }
                    for (member_pos, member) in group.members.items.iter().enumerate() {
                        if let Address::Mailbox(mailbox) = member {
                            let member_last = member_pos + 1 == group.members.items.len();
                            mailbox_tokens(mailbox, !member_last, &mut tokens);
                        }
                    }
                    if let Some(token) = tokens.last_mut() {
                        token.push(';');
                        if !last {
                            token.push(',');
                        }
                    }
                }
            }
        }
        fold_tokens(&tokens, options, used, output);
    }

    /// Human-readable form, no encoding or folding.
    pub fn to_display(&self) -> String {
        let mut output = String::new();
        for (pos, address) in self.items.iter().enumerate() {
            if pos > 0 {
                output.push_str(", ");
            }
            match address {
                Address::Mailbox(mailbox) => {
                    match &mailbox.name {
                        Some(name) => {
                            output.push_str(name);
                            output.push_str(" <");
                            output.push_str(&mailbox.address);
                            output.push('>');
                        }
                        None => output.push_str(&mailbox.address),
                    };
                }
                Address::Group(group) => {
                    output.push_str(group.name.as_deref().unwrap_or(""));
                    output.push_str(": ");
                    output.push_str(&group.members.to_display());
                    output.push(';');
                }
            }
        }
        output
    }
}

impl<'x> FromIterator<Address<'x>> for AddressList<'x> {
    fn from_iter<T: IntoIterator<Item = Address<'x>>>(iter: T) -> Self {
        AddressList {
            items: iter.into_iter().collect(),
            version: Cell::new(0),
        }
    }
}

impl<'x> From<Mailbox<'x>> for AddressList<'x> {
    fn from(mailbox: Mailbox<'x>) -> Self {
        [Address::Mailbox(mailbox)].into_iter().collect()
    }
}

impl fmt::Display for AddressList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

fn mailbox_tokens(mailbox: &Mailbox<'_>, comma: bool, tokens: &mut Vec<String>) {
    let has_name = mailbox.name.as_deref().is_some_and(|name| !name.is_empty());
    if has_name {
        name_tokens(mailbox.name.as_deref().unwrap(), tokens);
    }

    let mut addr = String::with_capacity(mailbox.address.len() + 3);
    if has_name {
        addr.push('<');
        addr.push_str(&mailbox.address);
        addr.push('>');
    } else {
        addr.push_str(&mailbox.address);
    }
    if comma {
        addr.push(',');
    }
    tokens.push(addr);
}

/// Display-name tokens: bare atoms when possible, one atomic quoted
/// string when specials are present, encoded words when non-ASCII.
fn name_tokens(name: &str, tokens: &mut Vec<String>) {
    if needs_encoding(name) {
        tokens.extend(encode_phrase(name));
    } else if name
        .bytes()
        .all(|ch| is_atom(ch) || ch == b' ' || ch == b'\t')
    {
        tokens.extend(name.split_whitespace().map(String::from));
    } else {
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push('"');
        for ch in name.chars() {
            if ch == '"' || ch == '\\' {
                quoted.push('\\');
            }
            quoted.push(ch);
        }
        quoted.push('"');
        tokens.push(quoted);
    }
}

/// Joins tokens with single spaces, inserting newline+tab before any
/// token that would cross the soft limit. Tokens are atomic: quoted
/// strings and encoded words are never split.
pub(crate) fn fold_tokens(
    tokens: &[String],
    options: &FormatOptions,
    used: usize,
    output: &mut String,
) {
    let mut column = used;
    for (pos, token) in tokens.iter().enumerate() {
        if pos > 0 {
            if column + 1 + token.len() > options.max_line_length && column > 1 {
                output.push_str(options.newline.as_str());
                output.push('\t');
                column = 1;
            } else {
                output.push(' ');
                column += 1;
            }
        }
        output.push_str(token);
        column += token.len();
    }
}
