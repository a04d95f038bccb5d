mod cache;
mod entry;
mod key;

pub use cache::{CacheConfig, QueryCache, Subscription};
pub use entry::{CacheSnapshot, FetchStatus};
pub use key::{Filter, FilterOp, KeyPredicate, Page, QueryKey, SearchSpec, SortDir, SortSpec};
