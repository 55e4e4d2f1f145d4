//! Project reference model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A known project a session's working directory can be matched against.
///
/// Projects are owned elsewhere; sessions only hold the `id` as a
/// non-owning back-reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProjectRef {
    /// Stable project identifier.
    pub id: String,
    /// Project root path used for working-directory matching.
    pub root: PathBuf,
}
