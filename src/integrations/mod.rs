//! External integrations module.
//!
//! Provides import of source material from issue trackers.

pub mod devops;

#[cfg(feature = "devops")]
pub use devops::DevOpsClient;
pub use devops::{
    format_work_item, DevOpsError, DevOpsResult, Project, ProjectList, SearchResults, WorkItem,
    WorkItemFields, WorkItemQuery,
};
