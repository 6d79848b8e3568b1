use std::sync::Arc;

use crate::engine::NativeSessionId;
use crate::selector::Fingerprint;
use crate::session::Session;

/**
    How acquisitions are matched against live sessions. Chosen once when the
    manager is built.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingPolicy {
    /// Every acquirer shares the one live session, whatever its init data.
    /// All tracks are assumed to be covered by a single license.
    Single,
    /// One session per distinct fingerprint.
    PerFingerprint,
}

impl SharingPolicy {
    pub fn from_multi_session(multi_session: bool) -> Self {
        if multi_session {
            Self::PerFingerprint
        } else {
            Self::Single
        }
    }

    pub(crate) fn admits(self, session: &Session, fingerprint: &Fingerprint) -> bool {
        match self {
            Self::Single => true,
            Self::PerFingerprint => session.can_reuse(fingerprint),
        }
    }
}

/**
    Live sessions of one manager. Membership means "currently acquired".

    Lookups are linear scans; a manager rarely holds more than a handful of
    sessions.
*/
#[derive(Default)]
pub(crate) struct SessionPool {
    sessions: Vec<Arc<Session>>,
}

impl SessionPool {
    pub(crate) fn find(&self, policy: SharingPolicy, fingerprint: &Fingerprint) -> Option<Arc<Session>> {
        self.sessions
            .iter()
            .find(|s| policy.admits(s, fingerprint))
            .cloned()
    }

    pub(crate) fn find_by_native_id(&self, id: &NativeSessionId) -> Option<Arc<Session>> {
        self.sessions
            .iter()
            .find(|s| s.has_native_session_id(id))
            .cloned()
    }

    pub(crate) fn insert(&mut self, session: Arc<Session>) {
        self.sessions.push(session);
    }

    pub(crate) fn contains(&self, session: &Arc<Session>) -> bool {
        self.sessions.iter().any(|s| Arc::ptr_eq(s, session))
    }

    pub(crate) fn remove(&mut self, session: &Arc<Session>) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| !Arc::ptr_eq(s, session));
        self.sessions.len() != before
    }

    pub(crate) fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
