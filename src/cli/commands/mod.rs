//! One module per subcommand, each exposing `execute`.

pub mod add;
#[cfg(feature = "audit-log")]
pub mod audit_cmd;
pub mod completions;
pub mod info;
pub mod init;
pub mod refresh_time;
pub mod status;
pub mod unlock;
pub mod unlock_all;
pub mod verify;
