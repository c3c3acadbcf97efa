use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::keys::TriggerKey;
use crate::value::{ScriptArgs, ScriptValue};

use super::{
    TriggerContext, TriggerError, TriggerGroup, TriggerGroupList, TriggerGroupRegistry,
    TriggerResult, NO_TRIGGER_GROUP,
};

/// Trigger groups attached to a definition. Unlike instance lists, groups are appended so
/// they run in declaration order.
pub struct DefTriggerGroupHolder<C: TriggerContext> {
    groups: TriggerGroupList<C>,
}

impl<C: TriggerContext> Clone for DefTriggerGroupHolder<C> {
    fn clone(&self) -> Self {
        Self {
            groups: self.groups.clone(),
        }
    }
}

impl<C: TriggerContext> Default for DefTriggerGroupHolder<C> {
    fn default() -> Self {
        Self {
            groups: TriggerGroupList::new(),
        }
    }
}

impl<C: TriggerContext> DefTriggerGroupHolder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves declared group names. Unknown names are logged and skipped; `"0"` means none.
    /// Returns the number of names that did not resolve.
    pub fn resolve_names<'a>(
        &mut self,
        owner: &str,
        names: impl IntoIterator<Item = &'a str>,
        registry: &TriggerGroupRegistry<C>,
    ) -> usize {
        let mut unresolved = 0;
        for name in names {
            let name = name.trim();
            if name.is_empty() || name == NO_TRIGGER_GROUP {
                continue;
            }
            match registry.get(name) {
                Some(group) => {
                    self.add_trigger_group(Arc::clone(group));
                }
                None => {
                    unresolved += 1;
                    warn!(owner, group = name, "trigger_group_unresolved");
                }
            }
        }
        unresolved
    }

    pub fn add_trigger_group(&mut self, group: Arc<TriggerGroup<C>>) -> bool {
        self.groups.append(group)
    }

    pub fn remove_trigger_group(&mut self, group: &Arc<TriggerGroup<C>>) -> bool {
        self.groups.remove(group)
    }

    pub fn has_trigger_group(&self, group: &Arc<TriggerGroup<C>>) -> bool {
        self.groups.contains(group)
    }

    pub fn clear_trigger_groups(&mut self) {
        self.groups.clear();
    }

    /// Cheap snapshot for dispatch.
    pub fn trigger_groups(&self) -> TriggerGroupList<C> {
        self.groups.clone()
    }

    pub fn trigger(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<Option<ScriptValue>, TriggerError> {
        self.groups.run(ctx, subject, key, args)
    }

    pub fn try_trigger(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Option<ScriptValue> {
        self.groups.try_run(ctx, subject, key, args)
    }

    pub fn cancellable_trigger(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<TriggerResult, TriggerError> {
        self.groups.cancellable(ctx, subject, key, args)
    }

    pub fn try_cancellable_trigger(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> TriggerResult {
        self.groups.try_cancellable(ctx, subject, key, args)
    }
}

impl<C: TriggerContext> fmt::Debug for DefTriggerGroupHolder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefTriggerGroupHolder")
            .field("groups", &self.groups)
            .finish()
    }
}
