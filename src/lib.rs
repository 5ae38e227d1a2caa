//! Infer which CPAN releases produced a local Perl library tree
//!
//! - [`inventory`]: installed modules and the installation log
//! - [`index`]: release index queries and their memo cache
//! - [`survey`]: candidate resolution, scoring and distribution reduction
//! - [`output`]: result formatting

pub mod config;
pub mod index;
pub mod inventory;
pub mod output;
pub mod survey;
pub mod version;
