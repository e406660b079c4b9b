pub mod commit;
pub mod identity;
pub mod merge;
pub mod replay;
pub mod repository;
pub mod source;
pub mod state;
pub mod tag;
pub mod target;

pub use identity::{Identity, WhenSpec};
pub use replay::{replay, FailurePolicy, ReplayOptions};
pub use repository::GitRepo;
pub use source::{ChangesetInfo, HgSource, Source};
pub use state::ConversionState;
pub use target::Target;
