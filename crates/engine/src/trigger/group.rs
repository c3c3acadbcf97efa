use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::error;

use crate::keys::{Key, TriggerKey};
use crate::value::{ScriptArgs, ScriptValue};

use super::{ScriptError, ScriptLocation, TriggerContext, TriggerError, GLOBAL_GROUP_SUFFIX};

pub type TriggerFn<C> = dyn Fn(&mut C, <C as TriggerContext>::Subject, &ScriptArgs) -> Result<ScriptValue, ScriptError>
    + Send
    + Sync;

/// Named bundle of handlers. Immutable once built; shared between holders through `Arc`.
pub struct TriggerGroup<C: TriggerContext> {
    name: String,
    origin: Option<ScriptLocation>,
    handlers: HashMap<TriggerKey, Arc<TriggerFn<C>>>,
}

impl<C: TriggerContext> TriggerGroup<C> {
    pub fn builder(name: impl Into<String>) -> TriggerGroupBuilder<C> {
        TriggerGroupBuilder {
            group: TriggerGroup {
                name: name.into(),
                origin: None,
                handlers: HashMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Option<&ScriptLocation> {
        self.origin.as_ref()
    }

    pub fn is_global(&self) -> bool {
        self.name.to_ascii_lowercase().ends_with(GLOBAL_GROUP_SUFFIX)
    }

    pub fn has_handler(&self, key: &TriggerKey) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// `Ok(None)` when the group has no handler for `key`.
    pub fn run(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Result<Option<ScriptValue>, TriggerError> {
        let Some(handler) = self.handlers.get(key) else {
            return Ok(None);
        };
        handler(ctx, subject, args)
            .map(Some)
            .map_err(|source| TriggerError::Handler {
                group: self.name.clone(),
                trigger: key.name().to_string(),
                source,
            })
    }

    /// Logs and swallows handler failures.
    pub fn try_run(
        &self,
        ctx: &mut C,
        subject: C::Subject,
        key: &TriggerKey,
        args: &ScriptArgs,
    ) -> Option<ScriptValue> {
        match self.run(ctx, subject, key, args) {
            Ok(result) => result,
            Err(err) => {
                let origin = self
                    .origin
                    .as_ref()
                    .map_or_else(|| "<native>".to_string(), ToString::to_string);
                error!(
                    group = %self.name,
                    trigger = %key,
                    subject = ?subject,
                    origin = %origin,
                    error = %err,
                    "trigger_handler_failed"
                );
                ctx.handler_failed(subject, args, &err);
                None
            }
        }
    }
}

impl<C: TriggerContext> fmt::Debug for TriggerGroup<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.handlers.keys().map(Key::name).collect::<Vec<_>>();
        keys.sort_unstable();
        f.debug_struct("TriggerGroup")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("handlers", &keys)
            .finish()
    }
}

pub struct TriggerGroupBuilder<C: TriggerContext> {
    group: TriggerGroup<C>,
}

impl<C: TriggerContext> TriggerGroupBuilder<C> {
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.group.origin = Some(ScriptLocation {
            file: file.into(),
            line,
        });
        self
    }

    /// A later handler for the same key replaces the earlier one.
    pub fn on<F>(mut self, key: TriggerKey, handler: F) -> Self
    where
        F: Fn(&mut C, C::Subject, &ScriptArgs) -> Result<ScriptValue, ScriptError>
            + Send
            + Sync
            + 'static,
    {
        self.group.handlers.insert(key, Arc::new(handler));
        self
    }

    pub fn build(self) -> TriggerGroup<C> {
        self.group
    }
}

/// Case-insensitive by-name table of every loaded trigger group.
pub struct TriggerGroupRegistry<C: TriggerContext> {
    groups: Vec<Arc<TriggerGroup<C>>>,
    lookup_by_lower_name: HashMap<String, usize>,
}

impl<C: TriggerContext> Default for TriggerGroupRegistry<C> {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            lookup_by_lower_name: HashMap::new(),
        }
    }
}

impl<C: TriggerContext> TriggerGroupRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, group: TriggerGroup<C>) -> Result<Arc<TriggerGroup<C>>, TriggerError> {
        let lower = group.name.to_ascii_lowercase();
        if self.lookup_by_lower_name.contains_key(&lower) {
            return Err(TriggerError::DuplicateTriggerGroup { name: group.name });
        }
        let group = Arc::new(group);
        self.lookup_by_lower_name.insert(lower, self.groups.len());
        self.groups.push(Arc::clone(&group));
        Ok(group)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TriggerGroup<C>>> {
        let index = self.lookup_by_lower_name.get(&name.to_ascii_lowercase())?;
        self.groups.get(*index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TriggerGroup<C>>> + '_ {
        self.groups.iter()
    }

    /// Groups whose name ends in `_global`, in registration order.
    pub fn globals(&self) -> impl Iterator<Item = &Arc<TriggerGroup<C>>> + '_ {
        self.groups.iter().filter(|group| group.is_global())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl<C: TriggerContext> fmt::Debug for TriggerGroupRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.groups.iter().map(|group| group.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyRegistry;

    #[derive(Default)]
    struct Log {
        calls: Vec<String>,
        failures: usize,
    }

    impl TriggerContext for Log {
        type Subject = u32;

        fn handler_failed(&mut self, _subject: u32, _args: &ScriptArgs, _error: &TriggerError) {
            self.failures += 1;
        }
    }

    #[test]
    fn run_without_handler_is_none() {
        let keys = KeyRegistry::new();
        let group = TriggerGroup::<Log>::builder("t_empty").build();
        let mut log = Log::default();
        let result = group
            .run(&mut log, 1, &keys.acquire("create"), &ScriptArgs::empty())
            .expect("run");
        assert_eq!(result, None);
    }

    #[test]
    fn handler_receives_subject_and_args() {
        let keys = KeyRegistry::new();
        let create = keys.acquire("create");
        let group = TriggerGroup::<Log>::builder("t_echo")
            .on(create.clone(), |log, subject, args| {
                log.calls.push(format!("{subject}:{:?}", args.get(0)));
                Ok(ScriptValue::Int(7))
            })
            .build();
        let mut log = Log::default();
        let args = ScriptArgs::new(vec![ScriptValue::Int(3)]);
        let result = group.run(&mut log, 42, &create, &args).expect("run");
        assert_eq!(result, Some(ScriptValue::Int(7)));
        assert_eq!(log.calls, vec!["42:Some(Int(3))".to_string()]);
    }

    #[test]
    fn try_run_swallows_and_reports_failure() {
        let keys = KeyRegistry::new();
        let destroy = keys.acquire("destroy");
        let group = TriggerGroup::<Log>::builder("t_broken")
            .at("scripts/broken.scp", 12)
            .on(destroy.clone(), |_, _, _| {
                Err(ScriptError::new("undefined variable").at("scripts/broken.scp", 14))
            })
            .build();
        let mut log = Log::default();
        assert!(group
            .try_run(&mut log, 1, &destroy, &ScriptArgs::empty())
            .is_none());
        assert_eq!(log.failures, 1);

        let err = group
            .run(&mut log, 1, &destroy, &ScriptArgs::empty())
            .expect_err("error");
        assert_eq!(
            err.to_string(),
            "trigger @destroy failed in group t_broken: undefined variable (scripts/broken.scp:14)"
        );
    }

    #[test]
    fn registry_is_case_insensitive_and_rejects_duplicates() {
        let mut registry = TriggerGroupRegistry::<Log>::new();
        registry
            .register(TriggerGroup::builder("t_Door").build())
            .expect("register");
        registry
            .register(TriggerGroup::builder("e_weather_global").build())
            .expect("register");
        let err = registry
            .register(TriggerGroup::builder("T_DOOR").build())
            .expect_err("duplicate");
        assert_eq!(
            err,
            TriggerError::DuplicateTriggerGroup {
                name: "T_DOOR".to_string()
            }
        );
        assert_eq!(registry.get("t_door").expect("door").name(), "t_Door");
        assert_eq!(
            registry.globals().map(|g| g.name()).collect::<Vec<_>>(),
            vec!["e_weather_global"]
        );
        assert_eq!(registry.len(), 2);
    }
}
