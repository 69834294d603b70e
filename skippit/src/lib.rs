//! Parsers and condition algebra for reftest manifests.
//!
//! The crate is split along the data it models:
//!
//! * [`vocab`] — the dimension registry: which condition atoms exist and how
//!   the reftest-JS vocabulary translates to the manifest-parser one.
//! * [`conditions`] — parsing, canonicalization, coverage, and merging of
//!   skip conditions.
//! * [`manifest`] — the reftest manifest format itself: `defaults`,
//!   `url-prefix`, `include` inheritance, and per-entry annotations.
//!
//! Nothing here touches the filesystem except through
//! [`manifest::ManifestSource`], so parsing is testable against in-memory
//! snapshots.

pub mod conditions;
pub mod manifest;
pub mod vocab;

/// Dependencies re-exported for downstream use with this crate's parsing
/// APIs.
pub mod reexport {
    pub use chumsky;
}
