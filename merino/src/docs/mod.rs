//! Documentation that spans the whole workspace.

pub mod overview;
pub mod testing;
