use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;

use tracing::debug;

use crate::cache::CacheDictionary;
use crate::keys::{TagKey, TriggerKey};
use crate::uid::Uid;
use crate::value::{ScriptArgs, ScriptValue};
use crate::world::World;

const MAX_PENDING_HOST_COMMANDS: usize = 32;

/// Commands applied directly to the world.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    Spawn { def_name: String, container: Option<Uid> },
    Delete { uid: Uid },
    Tag { uid: Uid, name: String, value: String },
    Untag { uid: Uid, name: String },
    Open { observer: Uid, container: Uid },
    Close { observer: Uid, container: Uid },
    Trigger { uid: Uid, trigger: String, actor: Option<Uid> },
    Purge,
    ResetUids,
}

/// Commands the hosting loop has to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Save,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCommand {
    Help,
    World(AdminCommand),
    Host(HostCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandParseError {
    reason: String,
    usage: String,
}

type ParseFn = dyn Fn(&[String]) -> Result<ParsedCommand, CommandParseError> + Send + Sync;

struct CommandSpec {
    name: String,
    help: String,
    arg_schema: String,
    parse: Box<ParseFn>,
}

pub struct CommandRegistry {
    specs: Vec<CommandSpec>,
    lookup_by_lower_name: HashMap<String, usize>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            lookup_by_lower_name: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Result<Self, String> {
        let mut registry = Self::new();
        registry.register("help", "List commands", "", parse_help_command)?;
        registry.register(
            "spawn",
            "Create a thing, optionally inside a container",
            "<def_name:string> [container:uid]",
            parse_spawn_command,
        )?;
        registry.register(
            "delete",
            "Delete a thing and everything inside it",
            "<uid>",
            parse_delete_command,
        )?;
        registry.register(
            "tag",
            "Set a tag on a thing",
            "<uid> <name> <value>",
            parse_tag_command,
        )?;
        registry.register("untag", "Remove a tag", "<uid> <name>", parse_untag_command)?;
        registry.register(
            "open",
            "Open a container for an observer",
            "<observer:uid> <container:uid>",
            parse_open_command,
        )?;
        registry.register(
            "close",
            "Close a container for an observer",
            "<observer:uid> <container:uid>",
            parse_close_command,
        )?;
        registry.register(
            "trigger",
            "Fire a trigger on a thing",
            "<uid> <trigger> [actor:uid]",
            parse_trigger_command,
        )?;
        registry.register("purge", "Sweep dead entries from weak caches", "", parse_purge_command)?;
        registry.register("reset_uids", "Compact thing uids", "", parse_reset_uids_command)?;
        registry.register("save", "Write a world snapshot", "", parse_save_command)?;
        registry.register("shutdown", "Save and stop the server", "", parse_shutdown_command)?;
        Ok(registry)
    }

    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        arg_schema: impl Into<String>,
        parse: F,
    ) -> Result<(), String>
    where
        F: Fn(&[String]) -> Result<ParsedCommand, CommandParseError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("command name cannot be empty".to_string());
        }
        let lower = name.to_ascii_lowercase();
        if self.lookup_by_lower_name.contains_key(&lower) {
            return Err(format!("duplicate command registration: {name}"));
        }

        self.specs.push(CommandSpec {
            name,
            help: help.into(),
            arg_schema: arg_schema.into(),
            parse: Box::new(parse),
        });
        self.lookup_by_lower_name.insert(lower, self.specs.len() - 1);
        Ok(())
    }

    fn lookup(&self, input_name: &str) -> Option<&CommandSpec> {
        let index = self.lookup_by_lower_name.get(&input_name.to_ascii_lowercase())?;
        self.specs.get(*index)
    }

    /// Registration order.
    pub fn iter_specs_in_order(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.specs.iter().map(|spec| {
            (
                spec.name.as_str(),
                spec.help.as_str(),
                spec.arg_schema.as_str(),
            )
        })
    }
}

/// Parses admin lines and applies them to a world. Parsed lines are kept in a usage cache
/// since operators tend to repeat the same handful of commands.
pub struct CommandProcessor {
    registry: CommandRegistry,
    parsed: CacheDictionary<String, ParsedCommand>,
    pending_host_commands: VecDeque<HostCommand>,
}

impl CommandProcessor {
    pub fn new(registry: CommandRegistry, cache_max_queue: NonZeroUsize) -> Self {
        Self {
            registry,
            parsed: CacheDictionary::new(cache_max_queue),
            pending_host_commands: VecDeque::new(),
        }
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    pub fn cached_lines(&self) -> usize {
        self.parsed.len()
    }

    pub fn drain_host_commands_into(&mut self, out: &mut Vec<HostCommand>) {
        out.extend(self.pending_host_commands.drain(..));
    }

    /// Returns the lines to show the operator.
    pub fn execute(&mut self, world: &mut World, raw_line: &str) -> Vec<String> {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        let parsed = match self.parsed.get(trimmed) {
            Some(parsed) => parsed.clone(),
            None => match self.parse_line(trimmed) {
                Ok(parsed) => {
                    self.parsed.insert(trimmed.to_string(), parsed.clone());
                    parsed
                }
                Err(line) => return vec![line],
            },
        };

        match parsed {
            ParsedCommand::Help => self.help_lines(),
            ParsedCommand::Host(command) => {
                self.push_host_command(command);
                Vec::new()
            }
            ParsedCommand::World(command) => {
                debug!(command = ?command, "admin_command");
                match apply_admin_command(world, command) {
                    Ok(lines) => lines,
                    Err(reason) => vec![format!("error: {reason}")],
                }
            }
        }
    }

    fn parse_line(&self, line: &str) -> Result<ParsedCommand, String> {
        let tokens = tokenize_line(line).map_err(|reason| format!("error: {reason}. usage: help"))?;
        let Some((command_name, args)) = tokens.split_first() else {
            return Err("error: empty command. usage: help".to_string());
        };
        let spec = self
            .registry
            .lookup(command_name)
            .ok_or_else(|| format!("error: unknown command '{command_name}'. try: help"))?;
        (spec.parse)(args).map_err(|error| format!("error: {}. usage: {}", error.reason, error.usage))
    }

    fn help_lines(&self) -> Vec<String> {
        self.registry
            .iter_specs_in_order()
            .map(|(name, help, arg_schema)| {
                if arg_schema.is_empty() {
                    format!("{name} - {help}")
                } else {
                    format!("{name} {arg_schema} - {help}")
                }
            })
            .collect()
    }

    fn push_host_command(&mut self, command: HostCommand) {
        if self.pending_host_commands.len() == MAX_PENDING_HOST_COMMANDS {
            self.pending_host_commands.pop_front();
        }
        self.pending_host_commands.push_back(command);
    }
}

fn apply_admin_command(world: &mut World, command: AdminCommand) -> Result<Vec<String>, String> {
    let lines = match command {
        AdminCommand::Spawn {
            def_name,
            container,
        } => {
            let uid = world.create_thing(&def_name).map_err(|e| e.to_string())?;
            if let Some(container) = container {
                world
                    .add_to_container(container, uid)
                    .map_err(|e| e.to_string())?;
            }
            vec![format!("spawned {def_name} as {uid}")]
        }
        AdminCommand::Delete { uid } => {
            world.delete_thing(uid).map_err(|e| e.to_string())?;
            vec![format!("deleted {uid}")]
        }
        AdminCommand::Tag { uid, name, value } => {
            let parsed =
                ScriptValue::parse_save_string(&value, world.keys()).map_err(|e| e.to_string())?;
            let key: TagKey = world.keys().acquire(&name);
            let thing = world
                .thing_mut(uid)
                .ok_or_else(|| format!("unknown thing {uid}"))?;
            thing.tags.set_tag(key, parsed);
            vec![format!("{uid} tag.{name} = {value}")]
        }
        AdminCommand::Untag { uid, name } => {
            let key: TagKey = world.keys().acquire(&name);
            let thing = world
                .thing_mut(uid)
                .ok_or_else(|| format!("unknown thing {uid}"))?;
            match thing.tags.remove_tag(&key) {
                Some(_) => vec![format!("{uid} tag.{name} removed")],
                None => vec![format!("{uid} has no tag.{name}")],
            }
        }
        AdminCommand::Open {
            observer,
            container,
        } => {
            world
                .open_container(observer, container)
                .map_err(|e| e.to_string())?;
            vec![format!("{observer} opened {container}")]
        }
        AdminCommand::Close {
            observer,
            container,
        } => {
            if world.close_container(observer, container) {
                vec![format!("{observer} closed {container}")]
            } else {
                vec![format!("{observer} did not have {container} open")]
            }
        }
        AdminCommand::Trigger {
            uid,
            trigger,
            actor,
        } => {
            let key: TriggerKey = world.keys().acquire(&trigger);
            let mut args = ScriptArgs::empty();
            if let Some(actor) = actor {
                args = args.with_actor(actor);
            }
            let result = world
                .try_trigger(uid, &key, &args)
                .map_err(|e| e.to_string())?;
            match result {
                Some(value) => vec![format!("@{trigger} on {uid} returned {value}")],
                None => vec![format!("@{trigger} on {uid}: no handler")],
            }
        }
        AdminCommand::Purge => {
            let summary = world.purge_caches();
            vec![format!(
                "purged {} entries from {} caches",
                summary.removed_entries, summary.caches
            )]
        }
        AdminCommand::ResetUids => {
            let remapped = world.reset_all_uids();
            vec![format!("remapped {remapped} uids")]
        }
    };
    Ok(lines)
}

fn tokenize_line(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut seen_token_content = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                seen_token_content = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if seen_token_content {
                    tokens.push(std::mem::take(&mut current));
                    seen_token_content = false;
                }
            }
            _ => {
                current.push(ch);
                seen_token_content = true;
            }
        }
    }

    if in_quotes {
        return Err("unterminated quoted string".to_string());
    }
    if seen_token_content {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_uid(raw: &str, what: &str, usage: &str) -> Result<Uid, CommandParseError> {
    let value = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => raw.parse::<u32>().ok(),
    };
    value.and_then(Uid::new).ok_or_else(|| CommandParseError {
        reason: format!("invalid {what} '{raw}' (expected a non-zero uid)"),
        usage: usage.to_string(),
    })
}

fn expect_args(args: &[String], counts: &[usize], usage: &str) -> Result<(), CommandParseError> {
    if counts.contains(&args.len()) {
        Ok(())
    } else {
        Err(CommandParseError {
            reason: format!("wrong number of arguments ({})", args.len()),
            usage: usage.to_string(),
        })
    }
}

fn parse_help_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    expect_args(args, &[0], "help")?;
    Ok(ParsedCommand::Help)
}

fn parse_spawn_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    const USAGE: &str = "spawn <def_name> [container]";
    expect_args(args, &[1, 2], USAGE)?;
    let container = match args.get(1) {
        Some(raw) => Some(parse_uid(raw, "container", USAGE)?),
        None => None,
    };
    Ok(ParsedCommand::World(AdminCommand::Spawn {
        def_name: args[0].clone(),
        container,
    }))
}

fn parse_delete_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    const USAGE: &str = "delete <uid>";
    expect_args(args, &[1], USAGE)?;
    Ok(ParsedCommand::World(AdminCommand::Delete {
        uid: parse_uid(&args[0], "uid", USAGE)?,
    }))
}

fn parse_tag_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    const USAGE: &str = "tag <uid> <name> <value>";
    expect_args(args, &[3], USAGE)?;
    Ok(ParsedCommand::World(AdminCommand::Tag {
        uid: parse_uid(&args[0], "uid", USAGE)?,
        name: args[1].clone(),
        value: args[2].clone(),
    }))
}

fn parse_untag_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    const USAGE: &str = "untag <uid> <name>";
    expect_args(args, &[2], USAGE)?;
    Ok(ParsedCommand::World(AdminCommand::Untag {
        uid: parse_uid(&args[0], "uid", USAGE)?,
        name: args[1].clone(),
    }))
}

fn parse_open_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    const USAGE: &str = "open <observer> <container>";
    expect_args(args, &[2], USAGE)?;
    Ok(ParsedCommand::World(AdminCommand::Open {
        observer: parse_uid(&args[0], "observer", USAGE)?,
        container: parse_uid(&args[1], "container", USAGE)?,
    }))
}

fn parse_close_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    const USAGE: &str = "close <observer> <container>";
    expect_args(args, &[2], USAGE)?;
    Ok(ParsedCommand::World(AdminCommand::Close {
        observer: parse_uid(&args[0], "observer", USAGE)?,
        container: parse_uid(&args[1], "container", USAGE)?,
    }))
}

fn parse_trigger_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    const USAGE: &str = "trigger <uid> <trigger> [actor]";
    expect_args(args, &[2, 3], USAGE)?;
    let actor = match args.get(2) {
        Some(raw) => Some(parse_uid(raw, "actor", USAGE)?),
        None => None,
    };
    Ok(ParsedCommand::World(AdminCommand::Trigger {
        uid: parse_uid(&args[0], "uid", USAGE)?,
        trigger: args[1].trim_start_matches('@').to_string(),
        actor,
    }))
}

fn parse_purge_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    expect_args(args, &[0], "purge")?;
    Ok(ParsedCommand::World(AdminCommand::Purge))
}

fn parse_reset_uids_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    expect_args(args, &[0], "reset_uids")?;
    Ok(ParsedCommand::World(AdminCommand::ResetUids))
}

fn parse_save_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    expect_args(args, &[0], "save")?;
    Ok(ParsedCommand::Host(HostCommand::Save))
}

fn parse_shutdown_command(args: &[String]) -> Result<ParsedCommand, CommandParseError> {
    expect_args(args, &[0], "shutdown")?;
    Ok(ParsedCommand::Host(HostCommand::Shutdown))
}
