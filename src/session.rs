//! Session: at most one logged-in user at a time, bound to a mounted
//! partition.

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Session {
    pub mount_id: String,
    pub user: String,
    pub group: String,
    pub uid: i32,
    pub gid: i32,
}

#[derive(Default)]
pub struct SessionManager {
    active: Option<Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn login(&mut self, mount_id: &str, user: &str, group: &str, uid: i32, gid: i32) -> Result<()> {
        if self.active.is_some() {
            return Err(Error::conflict("a session is already active"));
        }
        self.active = Some(Session {
            mount_id: mount_id.to_string(),
            user: user.to_string(),
            group: group.to_string(),
            uid,
            gid,
        });
        Ok(())
    }

    pub fn logout(&mut self) -> Result<()> {
        self.active
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::validation("no active session"))
    }

    pub fn current(&self) -> Result<&Session> {
        self.active
            .as_ref()
            .ok_or_else(|| Error::validation("no active session"))
    }

    pub fn is_root(&self) -> bool {
        self.active.as_ref().map(|s| s.user == "root").unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_one_session_at_a_time() {
        let mut mgr = SessionManager::new();
        mgr.login("991A", "root", "root", 1, 1).unwrap();
        let err = mgr.login("991A", "root", "root", 1, 1).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn logout_allows_relogin() {
        let mut mgr = SessionManager::new();
        mgr.login("991A", "root", "root", 1, 1).unwrap();
        mgr.logout().unwrap();
        mgr.login("991A", "alice", "users", 2, 1).unwrap();
    }

    #[test]
    fn logout_without_session_is_error() {
        let mut mgr = SessionManager::new();
        assert!(mgr.logout().is_err());
    }
}
