//! One call session per logged-in user

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use super::session::{CallSession, Collaborators};
use crate::config::CallSessionConfig;
use crate::errors::Result;
use crate::types::UserId;

/// Registry enforcing at most one [`CallSession`] per user
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<UserId, CallSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the user's session, creating it on first login
    pub fn login(
        &self,
        user: UserId,
        collaborators: Collaborators,
        config: CallSessionConfig,
    ) -> Result<CallSession> {
        match self.sessions.entry(user.clone()) {
            Entry::Occupied(existing) if existing.get().is_running() => Ok(existing.get().clone()),
            Entry::Occupied(mut stale) => {
                let session = CallSession::spawn(user.clone(), collaborators, config)?;
                stale.insert(session.clone());
                info!("Replaced stopped session for {}", user);
                Ok(session)
            }
            Entry::Vacant(vacant) => {
                let session = CallSession::spawn(user.clone(), collaborators, config)?;
                vacant.insert(session.clone());
                info!("Logged in {}", user);
                Ok(session)
            }
        }
    }

    pub fn get(&self, user: &UserId) -> Option<CallSession> {
        self.sessions.get(user).map(|entry| entry.value().clone())
    }

    /// Remove the user's session and shut it down
    pub async fn logout(&self, user: &UserId) -> Result<bool> {
        let Some((_, session)) = self.sessions.remove(user) else {
            return Ok(false);
        };
        session.shutdown().await?;
        info!("Logged out {}", user);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn users(&self) -> Vec<UserId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}
