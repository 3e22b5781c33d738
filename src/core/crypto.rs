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

use std::{collections::HashMap, rc::Rc};

use crate::stream::{Stream, StreamResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgo {
    Default,
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

/// Pluggable cryptography backend. The core never implements any of
/// this; it only dispatches by protocol string, so signed or encrypted
/// parts can be handed to whatever provider the application registers.
pub trait CryptoContext {
    /// MIME protocol of signatures, e.g. `application/pgp-signature`.
    fn signature_protocol(&self) -> &str;

    /// MIME protocol of encrypted parts, e.g. `application/pgp-encrypted`.
    fn encryption_protocol(&self) -> &str;

    /// MIME protocol of exported keys, e.g. `application/pgp-keys`.
    fn key_exchange_protocol(&self) -> &str;

    fn digest_id(&self, name: &str) -> DigestAlgo;

    fn digest_name(&self, digest: DigestAlgo) -> Option<&str>;

    fn sign(
        &self,
        detached: bool,
        user_id: &str,
        input: &mut dyn Stream,
        output: &mut dyn Stream,
    ) -> StreamResult<()>;

    /// Verifies a signature; returns whether every signature checked
    /// out.
    fn verify(
        &self,
        input: &mut dyn Stream,
        signature: Option<&mut dyn Stream>,
    ) -> StreamResult<bool>;

    fn encrypt(
        &self,
        sign: bool,
        user_id: Option<&str>,
        recipients: &[&str],
        input: &mut dyn Stream,
        output: &mut dyn Stream,
    ) -> StreamResult<()>;

    fn decrypt(&self, input: &mut dyn Stream, output: &mut dyn Stream) -> StreamResult<()>;

    fn import_keys(&self, input: &mut dyn Stream) -> StreamResult<usize>;

    fn export_keys(&self, keys: &[&str], output: &mut dyn Stream) -> StreamResult<usize>;
}

/// Maps protocol strings to crypto backends. A process-wide default
/// can be kept by the application; tests construct isolated instances.
#[derive(Default, Clone)]
pub struct CryptoRegistry {
    contexts: HashMap<String, Rc<dyn CryptoContext>>,
}

impl CryptoRegistry {
    pub fn new() -> Self {
        CryptoRegistry::default()
    }

    /// Registers a backend under every protocol string it advertises.
    pub fn register(&mut self, context: Rc<dyn CryptoContext>) {
        for protocol in [
            context.signature_protocol(),
            context.encryption_protocol(),
            context.key_exchange_protocol(),
        ] {
            self.contexts
                .insert(protocol.to_ascii_lowercase(), context.clone());
        }
    }

    pub fn lookup(&self, protocol: &str) -> Option<Rc<dyn CryptoContext>> {
        self.contexts.get(&protocol.to_ascii_lowercase()).cloned()
    }
}

impl std::fmt::Debug for CryptoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoRegistry")
            .field("protocols", &self.contexts.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::stream::{Stream, StreamResult};

    use super::{CryptoContext, CryptoRegistry, DigestAlgo};

    struct NullContext;

    impl CryptoContext for NullContext {
        fn signature_protocol(&self) -> &str {
            "application/x-null-signature"
        }
        fn encryption_protocol(&self) -> &str {
            "application/x-null-encrypted"
        }
        fn key_exchange_protocol(&self) -> &str {
            "application/x-null-keys"
        }
        fn digest_id(&self, name: &str) -> DigestAlgo {
            if name.eq_ignore_ascii_case("sha256") {
                DigestAlgo::Sha256
            } else {
                DigestAlgo::Default
            }
        }
        fn digest_name(&self, digest: DigestAlgo) -> Option<&str> {
            matches!(digest, DigestAlgo::Sha256).then_some("sha256")
        }
        fn sign(
            &self,
            _: bool,
            _: &str,
            _: &mut dyn Stream,
            _: &mut dyn Stream,
        ) -> StreamResult<()> {
            Ok(())
        }
        fn verify(
            &self,
            _: &mut dyn Stream,
            _: Option<&mut dyn Stream>,
        ) -> StreamResult<bool> {
            Ok(true)
        }
        fn encrypt(
            &self,
            _: bool,
            _: Option<&str>,
            _: &[&str],
            _: &mut dyn Stream,
            _: &mut dyn Stream,
        ) -> StreamResult<()> {
            Ok(())
        }
        fn decrypt(&self, _: &mut dyn Stream, _: &mut dyn Stream) -> StreamResult<()> {
            Ok(())
        }
        fn import_keys(&self, _: &mut dyn Stream) -> StreamResult<usize> {
            Ok(0)
        }
        fn export_keys(&self, _: &[&str], _: &mut dyn Stream) -> StreamResult<usize> {
            Ok(0)
        }
    }

    #[test]
    fn lookup_by_protocol() {
        let mut registry = CryptoRegistry::new();
        registry.register(Rc::new(NullContext));

        let context = registry.lookup("Application/X-Null-Signature").unwrap();
        assert_eq!(context.digest_id("sha256"), DigestAlgo::Sha256);
        assert_eq!(context.digest_name(DigestAlgo::Sha256), Some("sha256"));
        assert!(registry.lookup("application/pgp-signature").is_none());
    }
}
