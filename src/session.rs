use std::fs::OpenOptions;
use std::io::prelude::*;
use std::io::SeekFrom;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Durable client-side session state: which realm is connected, whether the
/// client runs in demo mode, and the transient new-connection marker set
/// right after an OAuth return to prompt for account selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub realm_id: Option<String>,
    #[serde(default)]
    pub demo: bool,
    #[serde(default)]
    pub new_connection: bool,
    /// Account-id allow-list for list/sync filtering; empty means all.
    #[serde(default)]
    pub active_account_ids: Vec<String>,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        self.realm_id.is_some() || self.demo
    }
}

/// Storage port for the session so the state container never touches the
/// filesystem directly and tests can run against memory.
pub trait SessionStore {
    fn load(&mut self) -> Result<Session>;
    fn save(&mut self, session: &Session) -> Result<()>;
}

impl<T: SessionStore + ?Sized> SessionStore for &mut T {
    fn load(&mut self) -> Result<Session> {
        (**self).load()
    }

    fn save(&mut self, session: &Session) -> Result<()> {
        (**self).save(session)
    }
}

pub struct FileSession {
    handle: std::fs::File,
}

impl FileSession {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let handle = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        Ok(Self { handle })
    }
}

impl SessionStore for FileSession {
    fn load(&mut self) -> Result<Session> {
        let mut content = String::new();
        self.handle.seek(SeekFrom::Start(0))?;
        self.handle.read_to_string(&mut content)?;

        Ok(serde_json::from_str(&content).unwrap_or_default())
    }

    fn save(&mut self, session: &Session) -> Result<()> {
        let json = serde_json::to_string_pretty(session)?;

        // Overwrite existing file contents.
        self.handle.set_len(0)?;
        self.handle.seek(SeekFrom::Start(0))?;
        write!(self.handle, "{}", json)?;
        self.handle.flush()?;

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySession {
    session: Session,
}

impl SessionStore for MemorySession {
    fn load(&mut self) -> Result<Session> {
        Ok(self.session.clone())
    }

    fn save(&mut self, session: &Session) -> Result<()> {
        self.session = session.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut store = FileSession::open(path.clone()).unwrap();
        let session = Session {
            realm_id: Some("realm-1".to_string()),
            demo: false,
            new_connection: true,
            active_account_ids: vec!["acct-1".to_string()],
        };
        store.save(&session).unwrap();

        let mut reopened = FileSession::open(path).unwrap();
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.realm_id.as_deref(), Some("realm-1"));
        assert!(loaded.new_connection);
        assert_eq!(loaded.active_account_ids, vec!["acct-1".to_string()]);
    }

    #[test]
    fn missing_or_empty_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSession::open(dir.path().join("session.json")).unwrap();

        let session = store.load().unwrap();
        assert!(session.realm_id.is_none());
        assert!(!session.is_connected());
    }
}
