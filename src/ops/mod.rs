//! The operations built on top of the store: adding, unlocking and
//! reporting status.

pub mod add;
pub mod status;
pub mod unlock;

pub use add::{add_file, add_file_renaming, AddRequest};
pub use status::{build_report, FileStatus, StatusReport};
pub use unlock::{Progress, UnlockSummary};
