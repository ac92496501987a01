//! Ordered participant identities with per-instance mutable state.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

/// An opaque, ordered, serializable name for a participant. Every party
/// carries one `self` identity and sees every other party's identity
/// through a [`PeerSet`].
pub trait Identity: Clone + Debug + Eq + Ord + Hash + Send + Sync + 'static {
    fn write(&self, buf: &mut crate::codec::Buffer);
    fn read(buf: &mut crate::codec::Cursor<'_>) -> crate::error::Result<Self>;
}

impl Identity for String {
    fn write(&self, buf: &mut crate::codec::Buffer) {
        buf.add_string(self);
    }

    fn read(buf: &mut crate::codec::Cursor<'_>) -> crate::error::Result<Self> {
        buf.read_string()
    }
}

/// Per-peer, per-instance mutable state: the peer's own numeric id for
/// this fronctocol instance, and whether it has reported completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerState {
    pub peer_id: Option<u64>,
    pub completed: bool,
}

impl PeerState {
    const fn new() -> Self {
        PeerState {
            peer_id: None,
            completed: false,
        }
    }
}

impl Default for PeerState {
    fn default() -> Self {
        Self::new()
    }
}

/// An ordered set of identities, each carrying [`PeerState`] scoped to one
/// fronctocol instance. Two `PeerSet`s are equal iff they name the same
/// identities — their per-peer state is intentionally excluded from
/// equality.
#[derive(Debug, Clone)]
pub struct PeerSet<I: Identity> {
    members: BTreeMap<I, PeerState>,
}

impl<I: Identity> PartialEq for PeerSet<I> {
    fn eq(&self, other: &Self) -> bool {
        self.members.keys().eq(other.members.keys())
    }
}
impl<I: Identity> Eq for PeerSet<I> {}

impl<I: Identity> PeerSet<I> {
    #[must_use]
    pub fn new() -> Self {
        PeerSet {
            members: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn from_identities(ids: impl IntoIterator<Item = I>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.insert(id);
        }
        set
    }

    pub fn insert(&mut self, id: I) {
        self.members.entry(id).or_default();
    }

    pub fn remove(&mut self, id: &I) -> Option<PeerState> {
        self.members.remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: &I) -> bool {
        self.members.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Stable iteration order: sorted by identity, identical on every party.
    pub fn iter(&self) -> impl Iterator<Item = (&I, &PeerState)> {
        self.members.iter()
    }

    pub fn iter_except<'a>(&'a self, me: &'a I) -> impl Iterator<Item = (&'a I, &'a PeerState)> {
        self.members.iter().filter(move |(id, _)| *id != me)
    }

    #[must_use]
    pub fn find_peer_id(&self, id: &I) -> Option<u64> {
        self.members.get(id).and_then(|s| s.peer_id)
    }

    /// Atomic test-and-set: sets `peer_id` for `id` only if it was
    /// previously unknown. Returns `true` if this call set it.
    pub fn check_and_set_id(&mut self, id: &I, peer_id: u64) -> bool {
        match self.members.get_mut(id) {
            Some(state) if state.peer_id.is_none() => {
                state.peer_id = Some(peer_id);
                true
            }
            _ => false,
        }
    }

    pub fn set_completed(&mut self, id: &I) {
        if let Some(state) = self.members.get_mut(id) {
            state.completed = true;
        }
    }

    #[must_use]
    pub fn has_all_peer_ids(&self) -> bool {
        self.members.values().all(|s| s.peer_id.is_some())
    }

    #[must_use]
    pub fn check_all_completed(&self) -> bool {
        self.members.values().all(|s| s.completed)
    }

    pub fn write(&self, buf: &mut crate::codec::Buffer) {
        buf.add_u32(u32::try_from(self.members.len()).expect("peer set larger than u32::MAX"));
        for id in self.members.keys() {
            id.write(buf);
        }
    }

    pub fn read(buf: &mut crate::codec::Cursor<'_>) -> crate::error::Result<Self> {
        let count = buf.read_u32()?;
        let mut set = Self::new();
        for _ in 0..count {
            set.insert(I::read(buf)?);
        }
        Ok(set)
    }
}

impl<I: Identity> Default for PeerSet<I> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_peer_state() {
        let mut a = PeerSet::<String>::from_identities(["alice".into(), "bob".into()]);
        let b = PeerSet::<String>::from_identities(["bob".into(), "alice".into()]);
        assert_eq!(a, b);
        a.check_and_set_id(&"alice".to_string(), 7);
        assert_eq!(a, b);
    }

    #[test]
    fn check_and_set_id_is_test_and_set() {
        let mut set = PeerSet::<String>::from_identities(["alice".into()]);
        assert!(set.check_and_set_id(&"alice".to_string(), 1));
        assert!(!set.check_and_set_id(&"alice".to_string(), 2));
        assert_eq!(set.find_peer_id(&"alice".to_string()), Some(1));
    }

    #[test]
    fn has_all_peer_ids_and_completion() {
        let mut set = PeerSet::<String>::from_identities(["alice".into(), "bob".into()]);
        assert!(!set.has_all_peer_ids());
        set.check_and_set_id(&"alice".to_string(), 1);
        assert!(!set.has_all_peer_ids());
        set.check_and_set_id(&"bob".to_string(), 2);
        assert!(set.has_all_peer_ids());

        assert!(!set.check_all_completed());
        set.set_completed(&"alice".to_string());
        set.set_completed(&"bob".to_string());
        assert!(set.check_all_completed());
    }

    #[test]
    fn wire_round_trip() {
        let set = PeerSet::<String>::from_identities(["zoe".into(), "amy".into(), "mel".into()]);
        let mut buf = crate::codec::Buffer::new();
        set.write(&mut buf);
        let mut cursor = buf.cursor();
        let restored = PeerSet::<String>::read(&mut cursor).unwrap();
        assert_eq!(set, restored);
        assert_eq!(
            restored.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>(),
            vec!["amy".to_string(), "mel".to_string(), "zoe".to_string()]
        );
    }
}
