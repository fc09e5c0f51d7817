/// Blog domain: posts with tags, comments, likes, bookmarks.

pub mod comments;
pub mod posts;
pub mod reactions;

pub use comments::{Comment, CommentManager, CommentThread};
pub use posts::{Post, PostManager, PostOrder, PostStatus, PostUpdate, Tag};
pub use reactions::{LikeEntry, ReactionManager, ToggleOutcome};
