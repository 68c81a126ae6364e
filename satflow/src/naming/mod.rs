//! Naming conventions: filename metadata, canonical keys and poll prefixes.

mod filename_meta;
mod keys;
mod prefixes;

pub use filename_meta::{FilenameMeta, FilenameMetaReader, FilenamePattern, FilenameRules};
pub use keys::{
    artifact_prefix, basename, canonical_key, canonical_prefix, normalize_extension,
    select_latest, StaticGridLocation,
};
pub use prefixes::PollLayout;
