mod usage;
mod weak;

pub use usage::CacheDictionary;
pub use weak::{
    LivenessOracle, Purge, PurgeRegistry, PurgeSummary, WeakEntry, WeakRefDictionary,
};
