use std::collections::HashMap;

use crate::containment::ComponentOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThingDefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginDefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThingKind {
    Item,
    Container,
    Character,
    Multi,
}

impl ThingKind {
    pub const ALLOWED: &'static str = "item, container, character, multi";

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "item" => Some(Self::Item),
            "container" => Some(Self::Container),
            "character" => Some(Self::Character),
            "multi" => Some(Self::Multi),
            _ => None,
        }
    }

    /// Characters carry a backpack-like contents list, so they hold things too.
    pub fn can_hold_things(self) -> bool {
        matches!(self, Self::Container | Self::Character)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Container => "container",
            Self::Character => "character",
            Self::Multi => "multi",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDef {
    pub model: u16,
    pub offset: ComponentOffset,
}

#[derive(Debug, Clone)]
pub struct ThingDefRecord {
    pub id: ThingDefId,
    pub def_name: String,
    pub kind: ThingKind,
    pub trigger_groups: Vec<String>,
    pub components: Vec<ComponentDef>,
}

#[derive(Debug, Clone)]
pub struct PluginDefRecord {
    pub id: PluginDefId,
    pub def_name: String,
    pub trigger_group: Option<String>,
    pub compiled: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct DefDatabase {
    thing_defs: Vec<ThingDefRecord>,
    thing_ids_by_name: HashMap<String, ThingDefId>,
    plugin_defs: Vec<PluginDefRecord>,
    plugin_ids_by_name: HashMap<String, PluginDefId>,
    fingerprint: String,
}

impl DefDatabase {
    pub(crate) fn from_defs(
        mut thing_defs: Vec<ThingDefRecord>,
        mut plugin_defs: Vec<PluginDefRecord>,
        fingerprint: String,
    ) -> Self {
        let mut thing_ids_by_name = HashMap::with_capacity(thing_defs.len());
        for (idx, def) in thing_defs.iter_mut().enumerate() {
            let id = ThingDefId(idx as u32);
            def.id = id;
            thing_ids_by_name.insert(def.def_name.clone(), id);
        }
        let mut plugin_ids_by_name = HashMap::with_capacity(plugin_defs.len());
        for (idx, def) in plugin_defs.iter_mut().enumerate() {
            let id = PluginDefId(idx as u32);
            def.id = id;
            plugin_ids_by_name.insert(def.def_name.clone(), id);
        }
        Self {
            thing_defs,
            thing_ids_by_name,
            plugin_defs,
            plugin_ids_by_name,
            fingerprint,
        }
    }

    pub fn thing_def_id_by_name(&self, name: &str) -> Option<ThingDefId> {
        self.thing_ids_by_name.get(name).copied()
    }

    pub fn thing_def(&self, id: ThingDefId) -> Option<&ThingDefRecord> {
        self.thing_defs.get(id.0 as usize)
    }

    pub fn thing_defs(&self) -> &[ThingDefRecord] {
        &self.thing_defs
    }

    pub fn plugin_def_id_by_name(&self, name: &str) -> Option<PluginDefId> {
        self.plugin_ids_by_name.get(name).copied()
    }

    pub fn plugin_def(&self, id: PluginDefId) -> Option<&PluginDefRecord> {
        self.plugin_defs.get(id.0 as usize)
    }

    pub fn plugin_defs(&self) -> &[PluginDefRecord] {
        &self.plugin_defs
    }

    /// SHA-256 over every compiled XML input, in load order.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
