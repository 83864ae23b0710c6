mod file;

pub use file::{FileRecord, NewFile};
