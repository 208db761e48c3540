//! Random-access store for per-gene sparse single-cell expression records.
//!
//! A [`catalog::Catalog`] maps gene identifiers to [`domain::GeneLocator`]s,
//! the [`reader`] fetches each record's bytes with bounded reads, and the
//! [`codec`] decodes them according to the file's [`format::FormatVersion`].
//! [`resolver::BatchResolver`] ties the three together for a batch of genes.

pub mod catalog;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod format;
pub mod output;
pub mod reader;
pub mod resolver;

pub use catalog::{Catalog, ManifestCatalog};
pub use domain::{Dataset, ExpressionRecord, GeneLocator, GexQueryResult, PermissionContext};
pub use error::{DecodeError, KiraError};
pub use format::FormatVersion;
pub use resolver::BatchResolver;
