//! Builtin workspace tools
//!
//! The tool catalog is fixed and minimal: exactly the five tools the
//! agents may call.

mod edit_file;
mod list_directory;
mod read_file;
mod run_bash;
mod write_file;

pub use edit_file::EditFileTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use run_bash::RunBashTool;
pub use write_file::WriteFileTool;
