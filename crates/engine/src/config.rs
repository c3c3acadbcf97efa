use serde::Deserialize;

pub const DEFAULT_UID_QUEUE_MAX_COUNT: usize = 1000;
pub const DEFAULT_INITIAL_UID_CAPACITY: usize = 1024;
pub const DEFAULT_UID_CEILING: u32 = 0x3FFF_FFFF;
pub const DEFAULT_FAKE_UID_RESERVE: u32 = 0x0010_0000;
pub const DEFAULT_REACH_RANGE: u32 = 2;
pub const DEFAULT_USAGE_CACHE_MAX_QUEUE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub uid_queue_max_count: usize,
    pub initial_uid_capacity: usize,
    pub uid_ceiling: u32,
    pub fake_uid_reserve: u32,
    pub reach_range: u32,
    pub usage_cache_max_queue: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            uid_queue_max_count: DEFAULT_UID_QUEUE_MAX_COUNT,
            initial_uid_capacity: DEFAULT_INITIAL_UID_CAPACITY,
            uid_ceiling: DEFAULT_UID_CEILING,
            fake_uid_reserve: DEFAULT_FAKE_UID_RESERVE,
            reach_range: DEFAULT_REACH_RANGE,
            usage_cache_max_queue: DEFAULT_USAGE_CACHE_MAX_QUEUE,
        }
    }
}

impl CoreConfig {
    /// Highest uid a real arena slot may receive; everything above it belongs to fake uids.
    pub fn max_real_uid(&self) -> u32 {
        self.uid_ceiling.saturating_sub(self.fake_uid_reserve)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.uid_queue_max_count == 0 {
            return Err("uid_queue_max_count must be >= 1".to_string());
        }
        if self.usage_cache_max_queue == 0 {
            return Err("usage_cache_max_queue must be >= 1".to_string());
        }
        if self.uid_ceiling & !crate::uid::UID_VALUE_MASK != 0 {
            return Err(format!(
                "uid_ceiling {:#x} overlaps the uid flag bits",
                self.uid_ceiling
            ));
        }
        if self.fake_uid_reserve >= self.uid_ceiling {
            return Err("fake_uid_reserve must be smaller than uid_ceiling".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoreConfig::default();
        config.validate().expect("valid");
        assert_eq!(config.max_real_uid(), 0x3FEF_FFFF);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: CoreConfig =
            serde_json::from_str(r#"{ "reach_range": 5 }"#).expect("parse");
        assert_eq!(config.reach_range, 5);
        assert_eq!(config.uid_queue_max_count, DEFAULT_UID_QUEUE_MAX_COUNT);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = serde_json::from_str::<CoreConfig>(r#"{ "reach": 5 }"#).expect_err("err");
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn zero_queue_is_invalid() {
        let config = CoreConfig {
            uid_queue_max_count: 0,
            ..CoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn flagged_ceiling_is_invalid() {
        let config = CoreConfig {
            uid_ceiling: 0x4000_0001,
            ..CoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
