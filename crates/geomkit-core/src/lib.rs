//! # Geomkit Core
//!
//! Leaf primitives shared by the geomkit crates:
//! - **Indexer**: deduplicates structured keys into dense integer slots
//! - **Math**: glam re-exports and the axis-aligned bounding box

pub mod indexer;
pub mod math;

pub use indexer::Indexer;
pub use math::BoundingBox;
