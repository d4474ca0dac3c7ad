//! Secrets decryption through an external command
//!
//! The command runs with the project root as working directory and is
//! expected to decrypt the encrypted secrets files in place. Its output is
//! never logged.

use sc_api::{ApiError, Cryptor};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

pub struct CommandCryptor {
    command: String,
    root: PathBuf,
    public_key: Option<String>,
}

impl CommandCryptor {
    pub fn new(command: impl Into<String>, root: &Path, public_key: Option<String>) -> Self {
        Self {
            command: command.into(),
            root: root.to_path_buf(),
            public_key,
        }
    }
}

impl Cryptor for CommandCryptor {
    fn decrypt_all(&self) -> sc_api::Result<()> {
        debug!(command = %self.command, root = %self.root.display(), "Running decrypt command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.command).current_dir(&self.root);
        if let Some(key) = &self.public_key {
            cmd.env("SC_PUBLIC_KEY", key);
        }
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;
        if !output.status.success() {
            return Err(ApiError::Decrypt(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn public_key(&self) -> Option<String> {
        self.public_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_runs_in_project_root() {
        let temp = TempDir::new().unwrap();
        let cryptor = CommandCryptor::new("echo \"$SC_PUBLIC_KEY\" > decrypted", temp.path(), Some("age1xyz".to_string()));

        cryptor.decrypt_all().unwrap();
        let written = std::fs::read_to_string(temp.path().join("decrypted")).unwrap();
        assert_eq!(written.trim(), "age1xyz");
        assert_eq!(cryptor.public_key().as_deref(), Some("age1xyz"));
    }

    #[test]
    fn test_failing_command_is_an_error() {
        let temp = TempDir::new().unwrap();
        let cryptor = CommandCryptor::new("echo bad key >&2; exit 3", temp.path(), None);

        match cryptor.decrypt_all() {
            Err(ApiError::Decrypt(message)) => assert!(message.contains("bad key")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
