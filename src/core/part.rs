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
    codecs::{Codec, Encoding},
    stream::{SharedStream, StreamResult},
};

/// Wraps a part body: a (possibly lazy) view of the parse source or a
/// memory buffer, together with the transfer encoding it is stored in.
#[derive(Debug, Clone)]
pub struct DataWrapper {
    stream: SharedStream,
    encoding: Encoding,
}

impl DataWrapper {
    pub fn new(stream: SharedStream, encoding: Encoding) -> Self {
        DataWrapper { stream, encoding }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>, encoding: Encoding) -> Self {
        DataWrapper {
            stream: SharedStream::from(bytes.into()),
            encoding,
        }
    }

    pub fn stream(&self) -> &SharedStream {
        &self.stream
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    /// The body octets exactly as stored, still transfer-encoded.
    pub fn raw(&self) -> StreamResult<Vec<u8>> {
        self.stream.reset()?;
        self.stream.read_to_end()
    }

    /// The body octets with the transfer encoding removed.
    pub fn decoded(&self) -> StreamResult<Vec<u8>> {
        let raw = self.raw()?;
        if self.encoding.is_identity() {
            return Ok(raw);
        }
        let mut codec = Codec::decoder(self.encoding);
        let mut decoded = Vec::with_capacity(codec.output_len(raw.len()));
        codec.flush(&raw, &mut decoded);
        if codec.is_truncated() {
            log::debug!("{} content ends mid-quantum", self.encoding);
        }
        Ok(decoded)
    }

    /// Length of the stored octets when the bounds are known.
    pub fn len(&self) -> Option<u64> {
        self.stream.length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl Default for DataWrapper {
    fn default() -> Self {
        DataWrapper::from_bytes(Vec::new(), Encoding::Default)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        codecs::{self, Encoding},
        stream::SharedStream,
    };

    use super::DataWrapper;

    #[test]
    fn decode_on_demand() {
        let encoded = codecs::encode(Encoding::Base64, b"hello body");
        let wrapper = DataWrapper::from_bytes(encoded.clone(), Encoding::Base64);
        assert_eq!(wrapper.raw().unwrap(), encoded);
        assert_eq!(wrapper.decoded().unwrap(), b"hello body");
    }

    #[test]
    fn substream_backed_body() {
        let source = SharedStream::from(&b"prefix[body]suffix"[..]);
        let wrapper = DataWrapper::new(
            SharedStream::new(source.substream(7, Some(11))),
            Encoding::SevenBit,
        );
        assert_eq!(wrapper.decoded().unwrap(), b"body");
        assert_eq!(wrapper.len(), Some(4));
    }
}
