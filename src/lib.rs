pub mod categorizer;
pub mod category;
pub mod codec;
pub mod error;
pub mod facade;
pub mod filter;
pub mod merge;
pub mod patch;
pub mod paths;
pub mod progress;
pub mod source;
pub mod store;
pub mod synth;

// Re-export commonly used types
pub use category::{Category, CategoryBitfield, CategoryDefinition};
pub use error::{DatabaseError, DatabaseResult};
pub use facade::{AsyncQueryPool, QueryResult};
pub use filter::{OrderBy, PatchFilter};
pub use merge::MergeReport;
pub use patch::{update, Favorite, PatchHolder};
pub use progress::{NoProgress, ProgressSink};
pub use source::SourceInfo;
pub use store::imports::ImportInfo;
pub use store::lists::{ListInfo, PatchList};
pub use store::patches::ReindexEntry;
pub use store::{export_database, OpenMode, PatchDatabase};
pub use synth::{resolver_from, SynthAdapter, SynthResolver};
