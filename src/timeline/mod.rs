pub mod builder;
pub mod event;
pub mod fetcher;
pub mod source;

pub use builder::{Timeline, TimelineBuilder};
pub use event::{CommitEvent, Event, EventId, PullRequestEvent};
pub use fetcher::{fetch_timeline, FetchOptions};
pub use source::{ChangeLookup, EventSource};
