//! Managed-Block Merger
//!
//! Edits hand-maintained files that several generation passes share. Both
//! flavors take the current content (or `None` for a missing file) and
//! return the merged content, or `None` when nothing needs to change, so a
//! repeated pass never produces a diff.
//!
//! ## Components
//! - [`document`]: line-ending preserving line view of a file
//! - [`region`]: marker-delimited [`ManagedRegion`]
//! - [`aggregator`]: block-replace mode ([`SeederLayout`])
//! - [`routes`]: anchor-and-register mode ([`merge_route`], [`RouteSyntax`])

pub mod aggregator;
pub mod document;
pub mod region;
pub mod routes;

pub use aggregator::{SEEDER_END_MARKER, SEEDER_START_MARKER, SeederLayout};
pub use document::{LineEnding, TextDocument};
pub use region::{ManagedRegion, OwnedStatement, RegionSpan};
pub use routes::{PhpRouteSyntax, RouteRegistration, RouteSyntax, derive_alias, merge_route};
