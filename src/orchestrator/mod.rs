//! Session orchestration: the manager, the resume probe, the dispatch facade.

pub mod dispatch;
pub mod manager;
pub(crate) mod resume;
