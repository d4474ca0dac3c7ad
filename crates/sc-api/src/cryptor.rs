//! Cryptor capability
//!
//! Secrets files are encrypted at rest by an external collaborator. The
//! provisioner only asks it to make the decrypted values available before it
//! logs into a backend; it never parses secrets files itself.

use crate::error::Result;

pub trait Cryptor: Send + Sync {
    /// Decrypts every encrypted secrets file of the project in place
    fn decrypt_all(&self) -> Result<()>;

    /// Public key the secrets are encrypted for, if one is configured
    fn public_key(&self) -> Option<String>;
}
