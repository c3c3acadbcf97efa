mod multi;

use std::fmt;

use thiserror::Error;

use crate::uid::Uid;

pub use multi::{find_component, ComponentOffset, MultiComponent, MultiComponentList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Contents,
    Components,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListId {
    pub owner: Uid,
    pub kind: ListKind,
}

impl ListId {
    pub fn contents(owner: Uid) -> Self {
        Self {
            owner,
            kind: ListKind::Contents,
        }
    }

    pub fn components(owner: Uid) -> Self {
        Self {
            owner,
            kind: ListKind::Components,
        }
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ListKind::Contents => write!(f, "contents of {}", self.owner),
            ListKind::Components => write!(f, "components of {}", self.owner),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainmentError {
    #[error("{member} is already linked into {owner}")]
    AlreadyLinked { member: String, owner: String },
    #[error("{member} does not exist in the backing store")]
    UnknownMember { member: String },
    #[error("corrupt link in {list} at {member}: {detail}")]
    CorruptLink {
        list: ListId,
        member: String,
        detail: &'static str,
    },
}

/// Per-member link fields. `owner` is set iff the member is physically in that list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link<M> {
    prev: Option<M>,
    next: Option<M>,
    owner: Option<ListId>,
}

impl<M> Default for Link<M> {
    fn default() -> Self {
        Self {
            prev: None,
            next: None,
            owner: None,
        }
    }
}

impl<M: Copy> Link<M> {
    pub fn owner(&self) -> Option<ListId> {
        self.owner
    }

    pub fn prev(&self) -> Option<M> {
        self.prev
    }

    pub fn next(&self) -> Option<M> {
        self.next
    }

    pub fn is_linked(&self) -> bool {
        self.owner.is_some() || self.prev.is_some() || self.next.is_some()
    }

    /// Rewrites every id stored in the link; used when uids are compacted.
    pub fn remap(&mut self, mut map_member: impl FnMut(M) -> M, map_owner: impl Fn(Uid) -> Uid) {
        self.prev = self.prev.map(&mut map_member);
        self.next = self.next.map(&mut map_member);
        if let Some(owner) = self.owner.as_mut() {
            owner.owner = map_owner(owner.owner);
        }
    }
}

pub trait LinkStore<M> {
    fn link(&self, member: M) -> Option<&Link<M>>;
    fn link_mut(&mut self, member: M) -> Option<&mut Link<M>>;
}

/// List head held by the container. `Copy` so it can be lifted out of the store while the
/// store is mutated and written back afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrusiveList<M> {
    id: ListId,
    first: Option<M>,
    count: usize,
}

impl<M> IntrusiveList<M>
where
    M: Copy + Eq + fmt::Display,
{
    pub fn new(id: ListId) -> Self {
        Self {
            id,
            first: None,
            count: 0,
        }
    }

    pub fn id(&self) -> ListId {
        self.id
    }

    pub fn first(&self) -> Option<M> {
        self.first
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn add<S: LinkStore<M>>(&mut self, store: &mut S, member: M) -> Result<(), ContainmentError> {
        let link = store.link(member).ok_or_else(|| ContainmentError::UnknownMember {
            member: member.to_string(),
        })?;
        if link.is_linked() {
            return Err(ContainmentError::AlreadyLinked {
                member: member.to_string(),
                owner: link
                    .owner
                    .map_or_else(|| "a dangling chain".to_string(), |owner| owner.to_string()),
            });
        }
        if let Some(first) = self.first {
            let first_link = store.link_mut(first).ok_or(ContainmentError::CorruptLink {
                list: self.id,
                member: first.to_string(),
                detail: "head element missing from store",
            })?;
            first_link.prev = Some(member);
        }
        if let Some(link) = store.link_mut(member) {
            *link = Link {
                prev: None,
                next: self.first,
                owner: Some(self.id),
            };
        }
        self.first = Some(member);
        self.count += 1;
        Ok(())
    }

    /// Returns `Ok(false)` when the member is not in this list.
    pub fn remove<S: LinkStore<M>>(
        &mut self,
        store: &mut S,
        member: M,
    ) -> Result<bool, ContainmentError> {
        let Some(link) = store.link(member).copied() else {
            return Ok(false);
        };
        if link.owner != Some(self.id) {
            return Ok(false);
        }

        match link.prev {
            Some(prev) => self.neighbor_mut(store, prev, member)?.next = link.next,
            None => {
                if self.first != Some(member) {
                    return Err(self.corrupt(member, "member has no prev but is not the head"));
                }
                self.first = link.next;
            }
        }
        if let Some(next) = link.next {
            self.neighbor_mut(store, next, member)?.prev = link.prev;
        }
        if let Some(link) = store.link_mut(member) {
            *link = Link::default();
        }
        self.count -= 1;
        Ok(true)
    }

    pub fn contains<S: LinkStore<M>>(&self, store: &S, member: M) -> bool {
        store
            .link(member)
            .is_some_and(|link| link.owner == Some(self.id))
    }

    pub fn cursor(&self) -> ListCursor<M> {
        ListCursor { next: self.first }
    }

    pub fn iter<'a, S: LinkStore<M>>(&self, store: &'a S) -> ListIter<'a, M, S> {
        ListIter {
            cursor: self.cursor(),
            store,
        }
    }

    pub fn find<S: LinkStore<M>>(&self, store: &S, mut predicate: impl FnMut(M) -> bool) -> Option<M> {
        self.iter(store).find(|member| predicate(*member))
    }

    pub fn get<S: LinkStore<M>>(&self, store: &S, index: usize) -> Option<M> {
        if index >= self.count {
            return None;
        }
        self.iter(store).nth(index)
    }

    /// Destroys every member. `destroy` may unlink or free the member it is given; whatever
    /// it leaves linked here is unlinked afterwards. Returns the number of steps taken.
    pub fn empty<S: LinkStore<M>>(
        &mut self,
        store: &mut S,
        mut destroy: impl FnMut(&mut Self, &mut S, M),
    ) -> Result<usize, ContainmentError> {
        let mut cursor = self.cursor();
        let mut steps = 0;
        while let Some(member) = cursor.advance(store) {
            destroy(self, store, member);
            self.remove(store, member)?;
            steps += 1;
        }
        Ok(steps)
    }

    /// Rewrites ids after compaction. The owner uid of the list itself is remapped too.
    pub fn remap(&mut self, map_member: impl FnOnce(M) -> M, map_owner: impl Fn(Uid) -> Uid) {
        self.first = self.first.map(map_member);
        self.id.owner = map_owner(self.id.owner);
    }

    fn neighbor_mut<'s, S: LinkStore<M>>(
        &self,
        store: &'s mut S,
        neighbor: M,
        member: M,
    ) -> Result<&'s mut Link<M>, ContainmentError> {
        let id = self.id;
        let link = store.link_mut(neighbor).ok_or_else(|| ContainmentError::CorruptLink {
            list: id,
            member: member.to_string(),
            detail: "neighbor missing from store",
        })?;
        if link.owner != Some(id) {
            return Err(ContainmentError::CorruptLink {
                list: id,
                member: member.to_string(),
                detail: "neighbor belongs to another list",
            });
        }
        Ok(link)
    }

    fn corrupt(&self, member: M, detail: &'static str) -> ContainmentError {
        ContainmentError::CorruptLink {
            list: self.id,
            member: member.to_string(),
            detail,
        }
    }
}

/// Detached walk position. `next` is read before the current member is handed out, so the
/// caller may unlink or free that member between steps.
#[derive(Debug, Clone, Copy)]
pub struct ListCursor<M> {
    next: Option<M>,
}

impl<M: Copy> ListCursor<M> {
    pub fn advance<S: LinkStore<M>>(&mut self, store: &S) -> Option<M> {
        let current = self.next?;
        self.next = store.link(current).and_then(|link| link.next);
        Some(current)
    }
}

pub struct ListIter<'a, M, S> {
    cursor: ListCursor<M>,
    store: &'a S,
}

impl<M: Copy, S: LinkStore<M>> Iterator for ListIter<'_, M, S> {
    type Item = M;

    fn next(&mut self) -> Option<M> {
        self.cursor.advance(self.store)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct Id(u32);

    impl fmt::Display for Id {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "#{}", self.0)
        }
    }

    #[derive(Default)]
    struct Store {
        links: HashMap<Id, Link<Id>>,
    }

    impl Store {
        fn with(ids: &[u32]) -> Self {
            Self {
                links: ids.iter().map(|id| (Id(*id), Link::default())).collect(),
            }
        }
    }

    impl LinkStore<Id> for Store {
        fn link(&self, member: Id) -> Option<&Link<Id>> {
            self.links.get(&member)
        }

        fn link_mut(&mut self, member: Id) -> Option<&mut Link<Id>> {
            self.links.get_mut(&member)
        }
    }

    fn list(owner: u32) -> IntrusiveList<Id> {
        IntrusiveList::new(ListId::contents(Uid::new(owner).expect("uid")))
    }

    fn members(list: &IntrusiveList<Id>, store: &Store) -> Vec<u32> {
        list.iter(store).map(|id| id.0).collect()
    }

    #[test]
    fn add_inserts_at_head() {
        let mut store = Store::with(&[1, 2, 3]);
        let mut contents = list(100);
        for id in [1, 2, 3] {
            contents.add(&mut store, Id(id)).expect("add");
        }
        assert_eq!(members(&contents, &store), vec![3, 2, 1]);
        assert_eq!(contents.len(), 3);
        assert_eq!(store.links[&Id(2)].owner(), Some(contents.id()));
    }

    #[test]
    fn adding_linked_member_to_second_list_is_fatal() {
        let mut store = Store::with(&[1]);
        let mut a = list(100);
        let mut b = list(200);
        a.add(&mut store, Id(1)).expect("add");
        let err = b.add(&mut store, Id(1)).expect_err("double link");
        assert!(matches!(err, ContainmentError::AlreadyLinked { .. }));
        assert_eq!(b.len(), 0);
        assert_eq!(a.len(), 1);
        assert_eq!(store.links[&Id(1)].owner(), Some(a.id()));
    }

    #[test]
    fn remove_from_foreign_list_is_a_no_op() {
        let mut store = Store::with(&[1]);
        let mut a = list(100);
        let mut b = list(200);
        a.add(&mut store, Id(1)).expect("add");
        assert!(!b.remove(&mut store, Id(1)).expect("remove"));
        assert!(!a.remove(&mut store, Id(9)).expect("unknown"));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn remove_middle_head_and_tail() {
        let mut store = Store::with(&[1, 2, 3, 4]);
        let mut contents = list(100);
        for id in [1, 2, 3, 4] {
            contents.add(&mut store, Id(id)).expect("add");
        }
        assert!(contents.remove(&mut store, Id(3)).expect("middle"));
        assert_eq!(members(&contents, &store), vec![4, 2, 1]);
        assert!(contents.remove(&mut store, Id(4)).expect("head"));
        assert!(contents.remove(&mut store, Id(1)).expect("tail"));
        assert_eq!(members(&contents, &store), vec![2]);
        assert_eq!(store.links[&Id(3)], Link::default());
        assert_eq!(contents.len(), 1);
    }

    #[test]
    fn find_and_index() {
        let mut store = Store::with(&[1, 2, 3]);
        let mut contents = list(100);
        for id in [1, 2, 3] {
            contents.add(&mut store, Id(id)).expect("add");
        }
        assert_eq!(contents.find(&store, |id| id.0 % 2 == 0), Some(Id(2)));
        assert_eq!(contents.find(&store, |id| id.0 > 10), None);
        assert_eq!(contents.get(&store, 0), Some(Id(3)));
        assert_eq!(contents.get(&store, 2), Some(Id(1)));
        assert_eq!(contents.get(&store, 3), None);
    }

    #[test]
    fn removing_current_during_walk_is_safe() {
        let mut store = Store::with(&[1, 2, 3, 4, 5]);
        let mut contents = list(100);
        for id in 1..=5 {
            contents.add(&mut store, Id(id)).expect("add");
        }
        let mut cursor = contents.cursor();
        let mut steps = 0;
        while let Some(member) = cursor.advance(&store) {
            assert!(contents.remove(&mut store, member).expect("remove"));
            steps += 1;
        }
        assert_eq!(steps, 5);
        assert!(contents.is_empty());
        assert_eq!(contents.first(), None);
    }

    #[test]
    fn empty_destroys_every_member_once() {
        let mut store = Store::with(&[1, 2, 3, 4]);
        let mut contents = list(100);
        for id in 1..=4 {
            contents.add(&mut store, Id(id)).expect("add");
        }
        let mut destroyed = Vec::new();
        let steps = contents
            .empty(&mut store, |list, store, member| {
                list.remove(store, member).expect("unlink");
                store.links.remove(&member);
                destroyed.push(member.0);
            })
            .expect("empty");
        assert_eq!(steps, 4);
        assert_eq!(destroyed, vec![4, 3, 2, 1]);
        assert!(contents.is_empty());
        assert!(store.links.is_empty());
    }

    #[test]
    fn inconsistent_head_is_reported() {
        let mut store = Store::with(&[1, 2]);
        let mut contents = list(100);
        contents.add(&mut store, Id(1)).expect("add");
        contents.add(&mut store, Id(2)).expect("add");
        store.links.get_mut(&Id(1)).expect("link").prev = None;
        let err = contents.remove(&mut store, Id(1)).expect_err("corrupt");
        assert!(matches!(err, ContainmentError::CorruptLink { .. }));
    }
}
