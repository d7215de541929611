//! Cache infrastructure - the intelligent cache and its indexes

mod intelligent;
mod single_flight;
mod tag_index;

pub use intelligent::{IntelligentCache, IntelligentCacheBuilder};
