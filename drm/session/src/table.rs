use crate::session::{Session, SessionId};

/**
    Registry of open sessions for the current content.

    Sessions are kept in insertion order so that bulk release is
    deterministic. A session inserted while there is no primary session
    becomes the primary one and keeps that role until it is removed.
*/
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: Vec<Session>,
    primary: Option<SessionId>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn primary(&self) -> Option<&SessionId> {
        self.primary.as_ref()
    }

    pub fn is_primary(&self, id: &SessionId) -> bool {
        self.primary.as_ref() == Some(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    /**
        Live session already opened for this content unit, if any.
    */
    pub fn find_live(&self, init_data: &[u8], unique_id: i32) -> Option<&Session> {
        self.sessions
            .iter()
            .find(|s| s.state().is_live() && s.matches(init_data, unique_id))
    }

    /**
        Any session, live or not, opened for this content unit.
    */
    pub fn find(&self, init_data: &[u8], unique_id: i32) -> Option<&Session> {
        self.sessions
            .iter()
            .find(|s| s.matches(init_data, unique_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    /**
        Insert a new session. Returns `true` if it became the primary one.
    */
    pub fn insert(&mut self, session: Session) -> bool {
        let primary = self.primary.is_none();
        if primary {
            self.primary = Some(session.id().clone());
        }
        self.sessions.push(session);
        primary
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.id() == id)?;
        if self.is_primary(id) {
            self.primary = None;
        }
        Some(self.sessions.remove(index))
    }

    /**
        Remove every session, oldest first.
    */
    pub fn drain(&mut self) -> Vec<Session> {
        self.primary = None;
        std::mem::take(&mut self.sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{OfflineMode, SessionState};

    fn session(id: u8, unique_id: i32) -> Session {
        Session::new(
            SessionId::new(vec![id]),
            b"pssh".to_vec(),
            OfflineMode::None,
            unique_id,
        )
    }

    #[test]
    fn first_insert_becomes_primary() {
        let mut table = SessionTable::new();
        assert!(table.insert(session(1, 0)));
        assert!(!table.insert(session(2, 1)));
        assert!(table.is_primary(&SessionId::new(vec![1])));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn find_live_matches_content_and_unique_id() {
        let mut table = SessionTable::new();
        table.insert(session(1, 0));
        assert!(table.find_live(b"pssh", 0).is_some());
        assert!(table.find_live(b"pssh", 1).is_none());
        assert!(table.find_live(b"other", 0).is_none());
    }

    #[test]
    fn find_live_skips_failed_sessions() {
        let mut table = SessionTable::new();
        table.insert(session(1, 0));
        table
            .get_mut(&SessionId::new(vec![1]))
            .unwrap()
            .transition(SessionState::Error(crate::ErrorCode::KeyUnavailable))
            .unwrap();
        assert!(table.find_live(b"pssh", 0).is_none());
        assert!(table.find(b"pssh", 0).is_some());
    }

    #[test]
    fn removing_primary_clears_role() {
        let mut table = SessionTable::new();
        table.insert(session(1, 0));
        table.insert(session(2, 1));
        let removed = table.remove(&SessionId::new(vec![1])).unwrap();
        assert_eq!(removed.unique_id(), 0);
        assert_eq!(table.primary(), None);
        assert!(table.remove(&SessionId::new(vec![1])).is_none());
    }

    #[test]
    fn drain_preserves_insertion_order() {
        let mut table = SessionTable::new();
        for id in [3, 1, 2] {
            table.insert(session(id, i32::from(id)));
        }
        let order: Vec<_> = table
            .drain()
            .into_iter()
            .map(|s| s.id().as_bytes()[0])
            .collect();
        assert_eq!(order, vec![3, 1, 2]);
        assert!(table.is_empty());
        assert_eq!(table.primary(), None);
    }
}
