//! Credential & permission directory.
//!
//! Users come from a compact user list string (`user:password:perm+perm|user2:password2`)
//! and optional OpenSSH public keys in `<keys_dir>/<username>.pub`. The directory is
//! loaded once at startup and is read-only afterwards.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use thiserror::Error;

use bronze_core::SftpConfig;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Malformed public key: {0}")]
    MalformedKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Write,
    Delete,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Delete => "delete",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "delete" => Ok(Permission::Delete),
            other => Err(other.to_string()),
        }
    }
}

const SUPPORTED_KEY_PREFIXES: [&str; 3] = ["ssh-rsa", "ssh-ed25519", "ecdsa-sha2"];

/// Public key as presented in OpenSSH one-line format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub key_type: String,
    pub blob: Vec<u8>,
}

impl PublicKey {
    /// Parse `<type> <base64 blob> [comment]`.
    pub fn parse_openssh(line: &str) -> Result<Self, DirectoryError> {
        let mut parts = line.split_whitespace();
        let (key_type, encoded) = match (parts.next(), parts.next()) {
            (Some(t), Some(b)) => (t, b),
            _ => {
                return Err(DirectoryError::MalformedKey(
                    "expected '<type> <base64>'".to_string(),
                ))
            }
        };

        if !SUPPORTED_KEY_PREFIXES.iter().any(|p| key_type.starts_with(p)) {
            return Err(DirectoryError::UnsupportedKeyType(key_type.to_string()));
        }

        let blob = STANDARD
            .decode(encoded)
            .map_err(|e| DirectoryError::MalformedKey(e.to_string()))?;

        Ok(Self {
            key_type: key_type.to_string(),
            blob,
        })
    }
}

#[derive(Clone)]
pub struct SftpUser {
    pub username: String,
    password: String,
    pub public_keys: Vec<PublicKey>,
    pub permissions: HashSet<Permission>,
}

impl fmt::Debug for SftpUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("public_keys", &self.public_keys.len())
            .field("permissions", &self.permissions)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, SftpUser>,
}

impl UserDirectory {
    /// Parse a user list. Malformed entries and unknown permissions are skipped
    /// with a warning; a user without a permission field gets read and write.
    pub fn parse(list: &str) -> Self {
        let mut users = HashMap::new();

        for entry in list.split('|').map(str::trim).filter(|e| !e.is_empty()) {
            let fields: Vec<&str> = entry.split(':').collect();
            if fields.len() < 2 || fields[0].trim().is_empty() {
                tracing::warn!(entry = %redact_entry(entry), "Invalid user entry");
                continue;
            }

            let username = fields[0].trim().to_string();
            let password = fields[1].trim().to_string();

            let permissions = match fields.get(2) {
                Some(list) => list
                    .split('+')
                    .filter(|p| !p.trim().is_empty())
                    .filter_map(|p| match p.parse::<Permission>() {
                        Ok(perm) => Some(perm),
                        Err(unknown) => {
                            tracing::warn!(username = %username, permission = %unknown, "Ignoring unknown permission");
                            None
                        }
                    })
                    .collect(),
                None => HashSet::from([Permission::Read, Permission::Write]),
            };

            tracing::info!(
                username = %username,
                permissions = ?permissions.iter().map(Permission::as_str).collect::<Vec<_>>(),
                "Loaded SFTP user"
            );

            users.insert(
                username.clone(),
                SftpUser {
                    username,
                    password,
                    public_keys: Vec::new(),
                    permissions,
                },
            );
        }

        Self { users }
    }

    /// Load `<dir>/<username>.pub` for every known user. A missing directory is
    /// not an error. Returns the number of keys loaded.
    pub fn load_keys(&mut self, dir: &Path) -> usize {
        if !dir.is_dir() {
            tracing::info!(dir = %dir.display(), "SSH keys directory doesn't exist, skipping key loading");
            return 0;
        }

        let mut loaded = 0;
        for user in self.users.values_mut() {
            let key_file = dir.join(format!("{}.pub", user.username));
            if !key_file.is_file() {
                continue;
            }

            let result = std::fs::read_to_string(&key_file)
                .map_err(DirectoryError::from)
                .and_then(|content| PublicKey::parse_openssh(content.trim()));

            match result {
                Ok(key) => {
                    tracing::info!(username = %user.username, key_type = %key.key_type, "Loaded SSH key");
                    user.public_keys.push(key);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(username = %user.username, error = %e, "Failed to load SSH key");
                }
            }
        }

        loaded
    }

    pub fn from_config(config: &SftpConfig) -> Self {
        let mut directory = Self::parse(&config.users);
        directory.load_keys(&config.keys_dir);
        directory
    }

    pub fn authenticate_password(&self, username: &str, password: &str) -> bool {
        let ok = self
            .users
            .get(username)
            .map(|user| bool::from(user.password.as_bytes().ct_eq(password.as_bytes())))
            .unwrap_or(false);

        if ok {
            tracing::info!(username = %username, "Password authentication successful");
        } else {
            tracing::warn!(username = %username, "Password authentication failed");
        }
        ok
    }

    pub fn authenticate_key(&self, username: &str, key: &PublicKey) -> bool {
        let Some(user) = self.users.get(username) else {
            tracing::warn!(username = %username, "Key authentication failed: unknown user");
            return false;
        };

        let ok = user
            .public_keys
            .iter()
            .any(|k| k.key_type == key.key_type && k.blob == key.blob);

        if ok {
            tracing::info!(username = %username, "SSH key authentication successful");
        } else {
            tracing::warn!(username = %username, "SSH key authentication failed");
        }
        ok
    }

    /// Permissions of a user; empty for unknown users.
    pub fn permissions(&self, username: &str) -> HashSet<Permission> {
        self.users
            .get(username)
            .map(|user| user.permissions.clone())
            .unwrap_or_default()
    }

    pub fn user_exists(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Authentication methods to advertise for a user.
    pub fn allowed_auths(&self, username: &str) -> &'static str {
        if self.user_exists(username) {
            "password,publickey"
        } else {
            "none"
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn redact_entry(entry: &str) -> String {
    match entry.split_once(':') {
        Some((user, _)) => format!("{}:***", user),
        None => entry.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ED25519_LINE: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIEV5ZXMgb25seSB0ZXN0IGtleSBibG9iIGJ5dGVzISE= bob@host";

    #[test]
    fn test_parse_default_permissions() {
        let dir = UserDirectory::parse("alice:secret:read+write");
        assert_eq!(dir.len(), 1);
        assert_eq!(
            dir.permissions("alice"),
            HashSet::from([Permission::Read, Permission::Write])
        );
        assert!(dir.authenticate_password("alice", "secret"));
        assert!(!dir.authenticate_password("alice", "Secret"));
        assert!(!dir.authenticate_password("mallory", "secret"));
    }

    #[test]
    fn test_parse_multiple_users_and_defaults() {
        let dir = UserDirectory::parse(
            " alice:secret:read+write+delete | readonly:ro:read || bob:pw | broken ",
        );
        assert_eq!(dir.len(), 3);
        assert!(dir.permissions("alice").contains(&Permission::Delete));
        assert_eq!(dir.permissions("readonly"), HashSet::from([Permission::Read]));
        assert_eq!(
            dir.permissions("bob"),
            HashSet::from([Permission::Read, Permission::Write])
        );
        assert!(!dir.user_exists("broken"));
    }

    #[test]
    fn test_unknown_permissions_are_ignored() {
        let dir = UserDirectory::parse("eve:pw:read+admin");
        assert_eq!(dir.permissions("eve"), HashSet::from([Permission::Read]));
        assert!(dir.permissions("nobody").is_empty());
    }

    #[test]
    fn test_allowed_auths() {
        let dir = UserDirectory::parse("alice:secret");
        assert_eq!(dir.allowed_auths("alice"), "password,publickey");
        assert_eq!(dir.allowed_auths("mallory"), "none");
    }

    #[test]
    fn test_parse_openssh_key() {
        let key = PublicKey::parse_openssh(ED25519_LINE).unwrap();
        assert_eq!(key.key_type, "ssh-ed25519");
        assert!(!key.blob.is_empty());

        assert!(matches!(
            PublicKey::parse_openssh("ssh-dss AAAA"),
            Err(DirectoryError::UnsupportedKeyType(_))
        ));
        assert!(matches!(
            PublicKey::parse_openssh("ssh-rsa"),
            Err(DirectoryError::MalformedKey(_))
        ));
        assert!(matches!(
            PublicKey::parse_openssh("ssh-rsa !!!notbase64"),
            Err(DirectoryError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_load_keys_and_authenticate() {
        let keys = tempdir().unwrap();
        std::fs::write(keys.path().join("bob.pub"), format!("{}\n", ED25519_LINE)).unwrap();
        std::fs::write(keys.path().join("carol.pub"), "ssh-dss AAAA carol@host").unwrap();

        let mut dir = UserDirectory::parse("bob:pw|carol:pw|dave:pw");
        assert_eq!(dir.load_keys(keys.path()), 1);

        let presented = PublicKey::parse_openssh(ED25519_LINE).unwrap();
        assert!(dir.authenticate_key("bob", &presented));
        assert!(!dir.authenticate_key("carol", &presented));
        assert!(!dir.authenticate_key("mallory", &presented));

        let other = PublicKey {
            key_type: "ssh-ed25519".to_string(),
            blob: vec![1, 2, 3],
        };
        assert!(!dir.authenticate_key("bob", &other));
    }

    #[test]
    fn test_missing_keys_dir_is_skipped() {
        let mut dir = UserDirectory::parse("bob:pw");
        assert_eq!(dir.load_keys(Path::new("/definitely/not/a/dir")), 0);
    }

    #[test]
    fn test_debug_redacts_password() {
        let dir = UserDirectory::parse("alice:hunter2");
        assert!(!format!("{:?}", dir).contains("hunter2"));
    }
}
