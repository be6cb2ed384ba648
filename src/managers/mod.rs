// SmartMarks state managers
// Managers handle stateful operations on the bookmark tree: moves, sessions, batch runs.

pub mod bookmark_tree;
pub mod move_coordinator;
pub mod organize_runner;
pub mod session_manager;
