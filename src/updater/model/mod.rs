pub use self::collection::FileCollection;
pub use self::file::{
    strip_version_suffix, Action, FileId, FileRecord, LocalState, LogicalFile, RecordId, Status,
};
pub use self::site::UpdateSite;
pub use self::version::{Dependency, Version};

mod collection;
mod file;
mod site;
mod version;
