use crate::containment::{IntrusiveList, Link, LinkStore, ListId, MultiComponentList};
use crate::content::{ThingDefId, ThingKind};
use crate::tags::TagHolder;
use crate::trigger::{PluginSlots, TriggerGroupList};
use crate::uid::{Uid, UidArena, UidSlot};

use super::{Point, World};

/// One world object. Lists and links hold uids; the arena owns the storage.
pub struct Thing {
    uid: Option<Uid>,
    def: ThingDefId,
    kind: ThingKind,
    pub(super) link: Link<Uid>,
    pub(super) contents: Option<IntrusiveList<Uid>>,
    pub(super) components: Option<MultiComponentList>,
    pub(super) point: Option<Point>,
    pub tags: TagHolder,
    pub(super) trigger_groups: TriggerGroupList<World>,
    pub(super) plugins: PluginSlots,
    deleted: bool,
}

impl Thing {
    pub(super) fn new(def: ThingDefId, kind: ThingKind) -> Self {
        Self {
            uid: None,
            def,
            kind,
            link: Link::default(),
            contents: None,
            components: None,
            point: None,
            tags: TagHolder::new(),
            trigger_groups: TriggerGroupList::new(),
            plugins: PluginSlots::new(),
            deleted: false,
        }
    }

    /// Creates the owned lists once the arena has assigned a uid.
    pub(super) fn init_lists(&mut self, uid: Uid) {
        if self.kind.can_hold_things() {
            self.contents = Some(IntrusiveList::new(ListId::contents(uid)));
        }
        if self.kind == ThingKind::Multi {
            self.components = Some(IntrusiveList::new(ListId::components(uid)));
        }
    }

    pub fn def(&self) -> ThingDefId {
        self.def
    }

    pub fn kind(&self) -> ThingKind {
        self.kind
    }

    pub fn point(&self) -> Option<Point> {
        self.point
    }

    /// Uid of the thing whose contents list holds this one.
    pub fn container(&self) -> Option<Uid> {
        self.link.owner().map(|list| list.owner)
    }

    pub fn contents_count(&self) -> usize {
        self.contents.map_or(0, |list| list.len())
    }

    pub fn trigger_group_names(&self) -> Vec<String> {
        self.trigger_groups.names()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub(super) fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

impl UidSlot for Thing {
    fn uid(&self) -> Option<Uid> {
        self.uid
    }

    fn set_uid(&mut self, uid: Option<Uid>) {
        self.uid = uid;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl std::fmt::Debug for Thing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thing")
            .field("uid", &self.uid)
            .field("def", &self.def)
            .field("kind", &self.kind)
            .field("container", &self.container())
            .field("point", &self.point)
            .field("contents", &self.contents_count())
            .field("deleted", &self.deleted)
            .finish()
    }
}

impl LinkStore<Uid> for UidArena<Thing> {
    fn link(&self, member: Uid) -> Option<&Link<Uid>> {
        self.get(member).map(|thing| &thing.link)
    }

    fn link_mut(&mut self, member: Uid) -> Option<&mut Link<Uid>> {
        self.get_mut(member).map(|thing| &mut thing.link)
    }
}

/// Outermost thing holding `uid`, or `uid` itself when it is not contained. Bounded by the
/// arena size so a corrupt cycle cannot hang the caller.
pub(super) fn top_of(things: &UidArena<Thing>, uid: Uid) -> Uid {
    let mut current = uid;
    for _ in 0..=things.len() {
        match things.get(current).and_then(Thing::container) {
            Some(container) => current = container,
            None => break,
        }
    }
    current
}
