//! Shared plumbing used across the yomi engine crates: product version
//! comparison and desktop-session identity.

pub mod system;
pub mod version;

pub use system::desktop_name;
pub use version::{compare_versions, product_version};
