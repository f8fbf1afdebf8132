use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::error::TutorError;
use crate::session::{DiagnosticProfile, LearningSession, SessionKey};

/// Registry of active sessions, keyed by (learner, session).
///
/// Implementations only guarantee that a single call is atomic. Two requests
/// for the same key must be serialized by the host; different keys are
/// independent.
pub trait SessionStore: Send + Sync {
    /// Register a fresh session in the diagnosis stage, replacing any entry under the same key.
    fn create(
        &self,
        key: SessionKey,
        weakest_concepts: Vec<String>,
        diagnostics: DiagnosticProfile,
    ) -> LearningSession;

    /// Snapshot of the session, if present.
    fn get(&self, key: &SessionKey) -> Option<LearningSession>;

    /// Apply `apply` in place and return the updated snapshot.
    fn mutate(
        &self,
        key: &SessionKey,
        apply: &mut dyn FnMut(&mut LearningSession),
    ) -> Result<LearningSession, TutorError>;

    fn remove(&self, key: &SessionKey) -> Option<LearningSession>;

    /// Drop every session matching `predicate`; returns the evicted keys.
    fn evict_where(&self, predicate: &dyn Fn(&LearningSession) -> bool) -> Vec<SessionKey>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn not_found(key: &SessionKey) -> TutorError {
    TutorError::SessionNotFound {
        learner_id: key.learner_id.clone(),
        session_id: key.session_id.clone(),
    }
}

/// Process-local store. Sessions do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, LearningSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionKey, LearningSession>> {
        self.sessions
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionKey, LearningSession>> {
        self.sessions
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(
        &self,
        key: SessionKey,
        weakest_concepts: Vec<String>,
        diagnostics: DiagnosticProfile,
    ) -> LearningSession {
        let session =
            LearningSession::new(key.clone(), weakest_concepts, diagnostics, Utc::now());
        if self.write().insert(key.clone(), session.clone()).is_some() {
            tracing::warn!(session = %key, "Replaced an existing session on create");
        }
        session
    }

    fn get(&self, key: &SessionKey) -> Option<LearningSession> {
        self.read().get(key).cloned()
    }

    fn mutate(
        &self,
        key: &SessionKey,
        apply: &mut dyn FnMut(&mut LearningSession),
    ) -> Result<LearningSession, TutorError> {
        let mut sessions = self.write();
        let session = sessions.get_mut(key).ok_or_else(|| not_found(key))?;
        apply(session);
        Ok(session.clone())
    }

    fn remove(&self, key: &SessionKey) -> Option<LearningSession> {
        self.write().remove(key)
    }

    fn evict_where(&self, predicate: &dyn Fn(&LearningSession) -> bool) -> Vec<SessionKey> {
        let mut sessions = self.write();
        let evicted: Vec<SessionKey> = sessions
            .iter()
            .filter(|(_, session)| predicate(session))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &evicted {
            sessions.remove(key);
        }
        evicted
    }

    fn len(&self) -> usize {
        self.read().len()
    }
}
