pub mod deleter;
pub mod reader;
pub mod renamer;
pub mod writer;

/// Handle to the local filesystem. All the `File*` traits are implemented on it;
/// it carries no state of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFile;
