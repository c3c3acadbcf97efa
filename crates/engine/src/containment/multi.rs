use serde::{Deserialize, Serialize};

use crate::uid::{Uid, UidArena, UidSlot};

use super::{IntrusiveList, Link, LinkStore};

pub type MultiComponentList = IntrusiveList<Uid>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentOffset {
    pub x: i16,
    pub y: i16,
    pub z: i8,
}

#[derive(Debug, Clone)]
pub struct MultiComponent {
    uid: Option<Uid>,
    pub model: u16,
    pub offset: ComponentOffset,
    link: Link<Uid>,
}

impl MultiComponent {
    pub fn new(model: u16, offset: ComponentOffset) -> Self {
        Self {
            uid: None,
            model,
            offset,
            link: Link::default(),
        }
    }

    pub fn link(&self) -> &Link<Uid> {
        &self.link
    }
}

impl UidSlot for MultiComponent {
    fn uid(&self) -> Option<Uid> {
        self.uid
    }

    fn set_uid(&mut self, uid: Option<Uid>) {
        self.uid = uid;
    }
}

impl LinkStore<Uid> for UidArena<MultiComponent> {
    fn link(&self, member: Uid) -> Option<&Link<Uid>> {
        self.get(member).map(|component| &component.link)
    }

    fn link_mut(&mut self, member: Uid) -> Option<&mut Link<Uid>> {
        self.get_mut(member).map(|component| &mut component.link)
    }
}

/// Finds the component at a relative offset, optionally requiring a model.
pub fn find_component(
    list: &MultiComponentList,
    store: &UidArena<MultiComponent>,
    offset: ComponentOffset,
    model: Option<u16>,
) -> Option<Uid> {
    list.find(store, |uid| {
        store.get(uid).is_some_and(|component| {
            component.offset == offset && model.map_or(true, |model| component.model == model)
        })
    })
}
