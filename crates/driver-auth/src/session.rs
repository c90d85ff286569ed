//! Bearer session validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;
use crate::AuthError;

/// An issued session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// User or driver the token was issued to
    pub user_id: Uuid,
    /// `None` for sessions that never expire
    pub expires_at: Option<DateTime<Utc>>,
}

/// Resolves a bearer token to the user it was issued to
pub trait SessionValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Session, AuthError>;
}

/// Session table held in memory, loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct InMemorySessions {
    sessions: HashMap<String, Session>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token
    pub fn insert(&mut self, token: impl Into<String>, session: Session) {
        self.sessions.insert(token.into(), session);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl FromIterator<(String, Uuid)> for InMemorySessions {
    fn from_iter<I: IntoIterator<Item = (String, Uuid)>>(iter: I) -> Self {
        let sessions = iter
            .into_iter()
            .map(|(token, user_id)| (token, Session { user_id, expires_at: None }))
            .collect();
        Self { sessions }
    }
}

impl SessionValidator for InMemorySessions {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Unauthorized);
        }

        let session = self.sessions.get(token).ok_or(AuthError::Unauthorized)?;
        if session.expires_at.is_some_and(|expiry| expiry <= now) {
            debug!(user_id = %session.user_id, "Rejected expired session");
            return Err(AuthError::Unauthorized);
        }
        Ok(session.clone())
    }
}
