//! Portable, exact block-sparse attention.
//!
//! This path favours clarity over absolute performance and defines the ground
//! truth that optimized candidates are validated against.

pub mod exact;

pub use exact::ExactBlockSparse;
