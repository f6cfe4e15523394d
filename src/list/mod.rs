pub mod actions;
pub mod feed;
pub mod pager;
pub mod state;

pub use actions::{PendingMutations, TodoActions};
pub use feed::TodoFeed;
pub use pager::{page_links, PageLink, PagedTodos};
pub use state::{display_number, ListState};
