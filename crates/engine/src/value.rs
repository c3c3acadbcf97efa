use std::fmt;

use crate::keys::{KeyRegistry, TriggerKey};
use crate::uid::Uid;

/// Dynamically typed value passed between script handlers and stored in tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ScriptValue {
    #[default]
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Thing(Uid),
    Trigger(TriggerKey),
}

impl ScriptValue {
    /// The cancel sentinel of cancellable triggers.
    pub fn is_one(&self) -> bool {
        match self {
            Self::Int(value) => *value == 1,
            Self::Float(value) => *value == 1.0,
            Self::Bool(value) => *value,
            Self::Str(value) => value.trim() == "1",
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_thing(&self) -> Option<Uid> {
        match self {
            Self::Thing(uid) => Some(*uid),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Text form used by the save hooks. Strings are JSON-quoted so they never collide with
    /// the numeric, `#uid` or `@trigger` forms.
    pub fn to_save_string(&self) -> String {
        match self {
            Self::None => "null".to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => format!("{value:?}"),
            Self::Bool(value) => value.to_string(),
            Self::Str(value) => serde_json::Value::String(value.clone()).to_string(),
            Self::Thing(uid) => format!("#{}", uid.get()),
            Self::Trigger(key) => format!("@{}", key.name()),
        }
    }

    pub fn parse_save_string(raw: &str, keys: &KeyRegistry) -> Result<Self, String> {
        let raw = raw.trim();
        match raw {
            "null" => return Ok(Self::None),
            "true" => return Ok(Self::Bool(true)),
            "false" => return Ok(Self::Bool(false)),
            _ => {}
        }
        if raw.starts_with('"') {
            return serde_json::from_str::<String>(raw)
                .map(Self::Str)
                .map_err(|error| format!("invalid quoted string: {error}"));
        }
        if let Some(rest) = raw.strip_prefix('#') {
            let parsed = rest
                .parse::<u32>()
                .map_err(|_| format!("invalid thing reference '{raw}'"))?;
            return Uid::new(parsed)
                .map(Self::Thing)
                .ok_or_else(|| format!("thing reference '{raw}' uses reserved uid 0"));
        }
        if let Some(name) = raw.strip_prefix('@') {
            if name.is_empty() {
                return Err("empty trigger key".to_string());
            }
            return Ok(Self::Trigger(keys.acquire(name)));
        }
        if let Ok(value) = raw.parse::<i64>() {
            return Ok(Self::Int(value));
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Self::Float(value)),
            _ => Err(format!("unrecognized value '{raw}'")),
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("null"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "\"{value}\""),
            Self::Thing(uid) => write!(f, "#{uid}"),
            Self::Trigger(key) => write!(f, "@{key}"),
        }
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<Uid> for ScriptValue {
    fn from(value: Uid) -> Self {
        Self::Thing(value)
    }
}

/// Arguments of one trigger invocation. `actor` is whoever initiated the action, if anyone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptArgs {
    pub argv: Vec<ScriptValue>,
    pub actor: Option<Uid>,
}

impl ScriptArgs {
    pub fn new(argv: Vec<ScriptValue>) -> Self {
        Self { argv, actor: None }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, actor: Uid) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn get(&self, index: usize) -> Option<&ScriptValue> {
        self.argv.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_sentinel_forms() {
        assert!(ScriptValue::Int(1).is_one());
        assert!(ScriptValue::Float(1.0).is_one());
        assert!(ScriptValue::Bool(true).is_one());
        assert!(ScriptValue::from("1").is_one());
        assert!(!ScriptValue::Int(0).is_one());
        assert!(!ScriptValue::None.is_one());
        assert!(!ScriptValue::from("one").is_one());
    }

    #[test]
    fn whole_float_keeps_its_type() {
        let keys = KeyRegistry::new();
        let text = ScriptValue::Float(3.0).to_save_string();
        assert_eq!(text, "3.0");
        assert_eq!(
            ScriptValue::parse_save_string(&text, &keys).expect("parse"),
            ScriptValue::Float(3.0)
        );
    }

    #[test]
    fn quoted_string_cannot_pose_as_reference() {
        let keys = KeyRegistry::new();
        let value = ScriptValue::from("#5 @destroy \"quoted\"");
        let parsed =
            ScriptValue::parse_save_string(&value.to_save_string(), &keys).expect("parse");
        assert_eq!(parsed, value);
    }

    #[test]
    fn sigil_forms_parse() {
        let keys = KeyRegistry::new();
        assert_eq!(
            ScriptValue::parse_save_string("#64", &keys).expect("thing"),
            ScriptValue::Thing(Uid::new(64).expect("uid"))
        );
        assert_eq!(
            ScriptValue::parse_save_string("@On_Timer", &keys).expect("trigger"),
            ScriptValue::Trigger(keys.acquire("on_timer"))
        );
    }

    #[test]
    fn bad_save_strings_are_rejected() {
        let keys = KeyRegistry::new();
        assert!(ScriptValue::parse_save_string("#0", &keys).is_err());
        assert!(ScriptValue::parse_save_string("#abc", &keys).is_err());
        assert!(ScriptValue::parse_save_string("@", &keys).is_err());
        assert!(ScriptValue::parse_save_string("\"open", &keys).is_err());
        assert!(ScriptValue::parse_save_string("banana", &keys).is_err());
        assert!(ScriptValue::parse_save_string("inf", &keys).is_err());
    }
}
