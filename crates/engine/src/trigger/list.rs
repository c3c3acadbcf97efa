use std::fmt;
use std::sync::Arc;

use crate::keys::TriggerKey;
use crate::value::{ScriptArgs, ScriptValue};

use super::{TriggerContext, TriggerError, TriggerGroup, TriggerResult};

struct Node<C: TriggerContext> {
    group: Arc<TriggerGroup<C>>,
    next: Option<Arc<Node<C>>>,
}

/// Persistent list of attached trigger groups. Cloning shares the nodes, so a dispatch can
/// walk a snapshot while handlers attach or detach groups on the live list.
pub struct TriggerGroupList<C: TriggerContext> {
    head: Option<Arc<Node<C>>>,
    len: usize,
}

impl<C: TriggerContext> Clone for TriggerGroupList<C> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<C: TriggerContext> Default for TriggerGroupList<C> {
    fn default() -> Self {
        Self { head: None, len: 0 }
    }
}

impl<C: TriggerContext> TriggerGroupList<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn iter(&self) -> Iter<'_, C> {
        Iter {
            next: self.head.as_deref(),
        }
    }

    pub fn contains(&self, group: &Arc<TriggerGroup<C>>) -> bool {
        self.iter().any(|attached| Arc::ptr_eq(attached, group))
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|group| group.name().to_string()).collect()
    }

    /// Attaches at the front. Returns false if the group is already attached.
    pub fn prepend(&mut self, group: Arc<TriggerGroup<C>>) -> bool {
        if self.contains(&group) {
            return false;
        }
        self.head = Some(Arc::new(Node {
            group,
            next: self.head.take(),
        }));
        self.len += 1;
        true
    }

    /// Attaches at the back. Returns false if the group is already attached.
    pub fn append(&mut self, group: Arc<TriggerGroup<C>>) -> bool {
        if self.contains(&group) {
            return false;
        }
        let mut groups = self.iter().cloned().collect::<Vec<_>>();
        groups.push(group);
        self.rebuild(groups);
        true
    }

    pub fn remove(&mut self, group: &Arc<TriggerGroup<C>>) -> bool {
        if !self.contains(group) {
            return false;
        }
        let groups = self
            .iter()
            .filter(|attached| !Arc::ptr_eq(attached, group))
            .cloned()
            .collect::<Vec<_>>();
        self.rebuild(groups);
        true
    }

    pub fn clear(&mut self) {
        self.head = None;
        self.len = 0;
    }

    fn rebuild(&mut self, groups: Vec<Arc<TriggerGroup<C>>>) {
        self.len = groups.len();
        self.head = groups
            .into_iter()
            .rev()
            .fold(None, |next, group| Some(Arc::new(Node { group, next })));
    }

    /// Runs every attached group that handles `key`, in order. The first failure stops the
    /// walk; otherwise the last value produced wins.
    pub fn run(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<Option<ScriptValue>, TriggerError> {
        let mut result = None;
        for group in self.iter() {
            if let Some(value) = group.run(ctx, subject, key, args)? {
                result = Some(value);
            }
        }
        Ok(result)
    }

    /// Like `run`, but a failing group is logged and skipped.
    pub fn try_run(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Option<ScriptValue> {
        let mut result = None;
        for group in self.iter() {
            if let Some(value) = group.try_run(ctx, subject, key, args) {
                result = Some(value);
            }
        }
        result
    }

    /// Stops at the first group returning a value equal to one.
    pub fn cancellable(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<TriggerResult, TriggerError> {
        for group in self.iter() {
            if group
                .run(ctx, subject, key, args)?
                .is_some_and(|value| value.is_one())
            {
                return Ok(TriggerResult::Cancel);
            }
        }
        Ok(TriggerResult::Continue)
    }

    pub fn try_cancellable(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> TriggerResult {
        for group in self.iter() {
            if group
                .try_run(ctx, subject, key, args)
                .is_some_and(|value| value.is_one())
            {
                return TriggerResult::Cancel;
            }
        }
        TriggerResult::Continue
    }
}

impl<C: TriggerContext> fmt::Debug for TriggerGroupList<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|group| group.name()))
            .finish()
    }
}

pub struct Iter<'a, C: TriggerContext> {
    next: Option<&'a Node<C>>,
}

impl<'a, C: TriggerContext> Iterator for Iter<'a, C> {
    type Item = &'a Arc<TriggerGroup<C>>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.next.as_deref();
        Some(&node.group)
    }
}
