//! Locating a tracked work inside feed results.
//!
//! [`strategy`] turns a (name, author) pair into an ordered list of feed
//! queries; [`thread_id`] decides whether a feed entry is the same thread.

pub mod strategy;
pub mod thread_id;

pub use strategy::{first_significant_word, generate_strategies, is_stop_word, SearchStrategy};
pub use thread_id::{extract_thread_id, normalise_url, same_work};
