//! URL exclusion and free-text filtering

pub mod exclusion;
pub mod fuzzy;

pub use exclusion::{matches, ExclusionList, ExclusionPattern};
pub use fuzzy::{filter_requests, DEFAULT_THRESHOLD};
