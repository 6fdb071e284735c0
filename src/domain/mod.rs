pub mod entities;

pub use entities::{CachedChannel, CachedVideo, CategoryStat, PendingVote};
