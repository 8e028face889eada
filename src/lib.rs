pub mod hamming;
pub mod header;
pub mod archive;
pub mod command;

pub use hamming::{HammingCodec, HammingConfig, HammingError};
pub use header::{FileEntry, HeaderError};
pub use archive::{Archive, ArchiveError, ExtractReport};
pub use command::{run, Command, Invocation, Outcome};
