// =============================================================================
// Token persistence — access token + expiry, file-backed (C1)
// =============================================================================
//
// The token is the single writer/many-reader resource described in spec.md
// §5: `TokenStore` guards it behind a `parking_lot::RwLock`, writers take the
// exclusive lock only long enough to swap the value and persist it to disk,
// readers take a shared lock and clone out. Persisted as JSON under
// `<data_dir>/token/token_info_<server>.json`, directory mode 0700, file
// mode 0600 — an implementation MUST fail to start if it cannot create
// these with the correct permissions (spec.md §4.1).
// =============================================================================

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::credentials::Server;
use crate::error::CoreError;

/// How far ahead of expiry a token is considered stale and due for refresh.
pub const REFRESH_MARGIN: Duration = Duration::minutes(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

/// File-backed token cache for one broker server (paper or live).
pub struct TokenStore {
    path: PathBuf,
    current: RwLock<Option<Token>>,
}

impl TokenStore {
    /// Open (and create, with enforced permissions) the token directory
    /// under `data_dir` for `server`. Loads any previously persisted token.
    pub fn open(data_dir: &std::path::Path, server: Server) -> Result<Self, CoreError> {
        let dir = data_dir.join("token");
        create_dir_0700(&dir)?;
        let path = dir.join(format!("token_info_{}.json", server.as_str()));

        let current = RwLock::new(Self::load_from_disk(&path));

        Ok(Self { path, current })
    }

    fn load_from_disk(path: &std::path::Path) -> Option<Token> {
        let bytes = std::fs::read(path).ok()?;
        match serde_json::from_slice::<Token>(&bytes) {
            Ok(token) => {
                debug!(path = %path.display(), "loaded persisted token");
                Some(token)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "failed to parse persisted token, ignoring");
                None
            }
        }
    }

    /// Current token, if any, regardless of freshness.
    pub fn get(&self) -> Option<Token> {
        self.current.read().clone()
    }

    /// `true` if a token exists and will stay valid for at least
    /// [`REFRESH_MARGIN`] from `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.current
            .read()
            .as_ref()
            .map(|t| t.is_fresh(now))
            .unwrap_or(false)
    }

    /// Replace the current token and persist it to disk with mode 0600.
    pub fn store(&self, token: Token) -> Result<(), CoreError> {
        let json = serde_json::to_vec_pretty(&token)
            .map_err(|e| CoreError::TokenRefresh(format!("failed to serialize token: {e}")))?;

        std::fs::write(&self.path, &json)
            .map_err(|e| CoreError::TokenRefresh(format!("failed to write token file: {e}")))?;
        set_mode_0600(&self.path)?;

        *self.current.write() = Some(token);
        info!(path = %self.path.display(), "token refreshed and persisted");
        Ok(())
    }

    /// Drop the in-memory token and delete the on-disk copy.
    pub fn clear(&self) {
        *self.current.write() = None;
        let _ = std::fs::remove_file(&self.path);
        info!("token cleared");
    }
}

#[cfg(unix)]
fn create_dir_0700(dir: &std::path::Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir)
        .map_err(|e| CoreError::Credential(format!("failed to create token dir: {e}")))?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| CoreError::Credential(format!("failed to chmod token dir to 0700: {e}")))
}

#[cfg(not(unix))]
fn create_dir_0700(dir: &std::path::Path) -> Result<(), CoreError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| CoreError::Credential(format!("failed to create token dir: {e}")))
}

#[cfg(unix)]
fn set_mode_0600(path: &std::path::Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| CoreError::TokenRefresh(format!("failed to chmod token file to 0600: {e}")))
}

#[cfg(not(unix))]
fn set_mode_0600(_path: &std::path::Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hantu-token-test-{name}-{}", uuid::Uuid::new_v4()));
        dir
    }

    #[test]
    fn fresh_when_far_from_expiry() {
        let token = Token {
            access_token: "abc".into(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        assert!(token.is_fresh(Utc::now()));
    }

    #[test]
    fn stale_within_refresh_margin() {
        let token = Token {
            access_token: "abc".into(),
            expires_at: Utc::now() + Duration::seconds(599),
        };
        assert!(!token.is_fresh(Utc::now()));
    }

    #[test]
    fn store_persists_and_reloads_with_permissions() {
        let dir = tmp_dir("store");
        let store = TokenStore::open(&dir, Server::Paper).unwrap();
        assert!(store.get().is_none());

        let token = Token {
            access_token: "tok-123".into(),
            expires_at: Utc::now() + Duration::hours(2),
        };
        store.store(token.clone()).unwrap();
        assert_eq!(store.get().unwrap().access_token, "tok-123");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let dir_mode = std::fs::metadata(dir.join("token")).unwrap().permissions().mode() & 0o777;
            assert_eq!(dir_mode, 0o700);
            let file_mode = std::fs::metadata(dir.join("token").join("token_info_paper.json"))
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(file_mode, 0o600);
        }

        // Reopening should reload the persisted token.
        let reopened = TokenStore::open(&dir, Server::Paper).unwrap();
        assert_eq!(reopened.get().unwrap().access_token, "tok-123");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn clear_removes_file_and_memory() {
        let dir = tmp_dir("clear");
        let store = TokenStore::open(&dir, Server::Live).unwrap();
        store
            .store(Token {
                access_token: "x".into(),
                expires_at: Utc::now() + Duration::hours(1),
            })
            .unwrap();
        store.clear();
        assert!(store.get().is_none());
        assert!(!dir.join("token").join("token_info_live.json").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
