use std::collections::HashMap;

use crate::keys::{KeyRegistry, TagKey, TimerKey, TriggerKey};
use crate::persist::{PersistError, SaveSink, TAG_PREFIX, TIMER_PREFIX};
use crate::uid::Uid;
use crate::value::ScriptValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundTimer {
    pub due_tick: u64,
    pub period: Option<u64>,
    pub trigger: TriggerKey,
}

impl BoundTimer {
    fn to_save_string(&self) -> String {
        match self.period {
            Some(period) => format!("{},{},@{}", self.due_tick, period, self.trigger.name()),
            None => format!("{},-,@{}", self.due_tick, self.trigger.name()),
        }
    }

    fn parse_save_string(raw: &str, keys: &KeyRegistry) -> Result<Self, String> {
        let mut parts = raw.trim().splitn(3, ',');
        let due_tick = parts
            .next()
            .and_then(|part| part.trim().parse::<u64>().ok())
            .ok_or_else(|| format!("timer '{raw}' has no due tick"))?;
        let period = match parts.next().map(str::trim) {
            Some("-") => None,
            Some(value) => Some(
                value
                    .parse::<u64>()
                    .map_err(|_| format!("timer '{raw}' has an invalid period"))?,
            ),
            None => return Err(format!("timer '{raw}' has no period field")),
        };
        let trigger = parts
            .next()
            .and_then(|part| part.trim().strip_prefix('@'))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| format!("timer '{raw}' has no @trigger"))?;
        Ok(Self {
            due_tick,
            period,
            trigger: keys.acquire(trigger),
        })
    }
}

#[derive(Debug, Clone, Default)]
struct TagTable {
    tags: HashMap<TagKey, ScriptValue>,
    timers: HashMap<TimerKey, BoundTimer>,
}

/// Sparse tag and timer bag. Storage is only allocated while something is stored.
#[derive(Debug, Clone, Default)]
pub struct TagHolder {
    table: Option<Box<TagTable>>,
}

impl TagHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Setting `ScriptValue::None` removes the tag.
    pub fn set_tag(&mut self, key: TagKey, value: ScriptValue) {
        if value.is_none() {
            self.remove_tag(&key);
            return;
        }
        self.table_mut().tags.insert(key, value);
    }

    pub fn get_tag(&self, key: &TagKey) -> Option<&ScriptValue> {
        self.table.as_ref()?.tags.get(key)
    }

    pub fn has_tag(&self, key: &TagKey) -> bool {
        self.get_tag(key).is_some()
    }

    pub fn remove_tag(&mut self, key: &TagKey) -> Option<ScriptValue> {
        let removed = self.table.as_mut()?.tags.remove(key);
        self.release_if_empty();
        removed
    }

    pub fn clear_tags(&mut self) {
        if let Some(table) = self.table.as_mut() {
            table.tags.clear();
        }
        self.release_if_empty();
    }

    pub fn tags(&self) -> impl Iterator<Item = (&TagKey, &ScriptValue)> + '_ {
        self.table.iter().flat_map(|table| table.tags.iter())
    }

    pub fn tag_count(&self) -> usize {
        self.table.as_ref().map_or(0, |table| table.tags.len())
    }

    /// One `name = value` line per tag, sorted by name.
    pub fn list_tags(&self) -> Vec<String> {
        let mut lines = self
            .tags()
            .map(|(key, value)| format!("{} = {}", key.name(), value))
            .collect::<Vec<_>>();
        lines.sort();
        lines
    }

    /// Replaces any timer already bound to `key` and returns it.
    pub fn add_timer(&mut self, key: TimerKey, timer: BoundTimer) -> Option<BoundTimer> {
        self.table_mut().timers.insert(key, timer)
    }

    pub fn get_timer(&self, key: &TimerKey) -> Option<&BoundTimer> {
        self.table.as_ref()?.timers.get(key)
    }

    pub fn has_timer(&self, key: &TimerKey) -> bool {
        self.get_timer(key).is_some()
    }

    pub fn remove_timer(&mut self, key: &TimerKey) -> Option<BoundTimer> {
        let removed = self.table.as_mut()?.timers.remove(key);
        self.release_if_empty();
        removed
    }

    pub fn delete_timers(&mut self) {
        if let Some(table) = self.table.as_mut() {
            table.timers.clear();
        }
        self.release_if_empty();
    }

    pub fn timers(&self) -> impl Iterator<Item = (&TimerKey, &BoundTimer)> + '_ {
        self.table.iter().flat_map(|table| table.timers.iter())
    }

    pub fn has_timers(&self) -> bool {
        self.table.as_ref().is_some_and(|table| !table.timers.is_empty())
    }

    /// Pops every timer due at or before `now`. Periodic timers are rescheduled in place.
    pub fn take_due_timers(&mut self, now: u64) -> Vec<(TimerKey, TriggerKey)> {
        let Some(table) = self.table.as_mut() else {
            return Vec::new();
        };
        let mut fired = Vec::new();
        table.timers.retain(|key, timer| {
            if timer.due_tick > now {
                return true;
            }
            fired.push((key.clone(), timer.trigger.clone()));
            match timer.period {
                Some(period) => {
                    timer.due_tick = now.saturating_add(period.max(1));
                    true
                }
                None => false,
            }
        });
        fired.sort_by(|(a, _), (b, _)| a.cmp(b));
        self.release_if_empty();
        fired
    }

    /// Writes `tag.<name>` and `%<name>` entries. Tags pointing at things that are no longer
    /// live are dropped instead of saved.
    pub fn save(&mut self, sink: &mut dyn SaveSink, is_live: impl Fn(Uid) -> bool) {
        let Some(table) = self.table.as_mut() else {
            return;
        };
        table
            .tags
            .retain(|_, value| value.as_thing().map_or(true, &is_live));

        let mut tags = table.tags.iter().collect::<Vec<_>>();
        tags.sort_by(|(a, _), (b, _)| a.name().cmp(b.name()));
        for (key, value) in tags {
            sink.save_value(&format!("{TAG_PREFIX}{}", key.name()), &value.to_save_string());
        }

        let mut timers = table.timers.iter().collect::<Vec<_>>();
        timers.sort_by(|(a, _), (b, _)| a.name().cmp(b.name()));
        for (key, timer) in timers {
            sink.save_value(&format!("{TIMER_PREFIX}{}", key.name()), &timer.to_save_string());
        }
        self.release_if_empty();
    }

    /// Returns `Ok(false)` when `name` is not a tag or timer property.
    pub fn load_line(
        &mut self,
        name: &str,
        value: &str,
        keys: &KeyRegistry,
    ) -> Result<bool, PersistError> {
        let invalid = |reason: String| PersistError::InvalidValue {
            name: name.to_string(),
            reason,
        };
        if let Some(tag) = strip_prefix_ignore_case(name, TAG_PREFIX) {
            if tag.is_empty() {
                return Err(invalid("empty tag name".to_string()));
            }
            let parsed = ScriptValue::parse_save_string(value, keys).map_err(invalid)?;
            self.set_tag(keys.acquire(tag), parsed);
            return Ok(true);
        }
        if let Some(timer) = name.strip_prefix(TIMER_PREFIX) {
            if timer.is_empty() {
                return Err(invalid("empty timer name".to_string()));
            }
            let parsed = BoundTimer::parse_save_string(value, keys).map_err(invalid)?;
            self.add_timer(keys.acquire(timer), parsed);
            return Ok(true);
        }
        Ok(false)
    }

    /// Rewrites thing references held in tag values after uid compaction.
    pub fn remap_things(&mut self, map: impl Fn(Uid) -> Uid) {
        let Some(table) = self.table.as_mut() else {
            return;
        };
        for value in table.tags.values_mut() {
            if let ScriptValue::Thing(uid) = value {
                *uid = map(*uid);
            }
        }
    }

    fn table_mut(&mut self) -> &mut TagTable {
        self.table.get_or_insert_with(Box::default)
    }

    fn release_if_empty(&mut self) {
        if self
            .table
            .as_ref()
            .is_some_and(|table| table.tags.is_empty() && table.timers.is_empty())
        {
            self.table = None;
        }
    }
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &name[prefix.len()..])
}
