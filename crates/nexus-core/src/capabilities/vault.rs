//! `nexus::secure` - the encrypted vault
//!
//! Scripts only ever see plaintext values they stored; the key stays on
//! the host side. A missing secret and an unreadable one both come back
//! as `()`.

use crate::namespace::Namespace;
use crate::registry::{Capability, ModuleKind};
use nexus_crypto::SecureVault;
use serde_json::Value;
use std::sync::Arc;

pub struct VaultCapability {
    vault: Arc<SecureVault>,
}

impl VaultCapability {
    pub fn new(vault: Arc<SecureVault>) -> Self {
        Self { vault }
    }
}

impl Capability for VaultCapability {
    fn key(&self) -> &str {
        ModuleKind::Vault.key()
    }

    fn register(&self, namespace: &mut Namespace) {
        let module = namespace.module(self.key());

        let vault = self.vault.clone();
        module.function("set", 2..=2, move |args| {
            vault.store(&args.string(0)?, &args.display(1))?;
            Ok(Value::Null)
        });

        let vault = self.vault.clone();
        module.function("get", 1..=1, move |args| {
            Ok(vault
                .retrieve(&args.string(0)?)
                .map(Value::String)
                .unwrap_or(Value::Null))
        });
    }
}
