pub mod fs_atomic;
pub mod ids;
pub mod logging;
pub mod subject;
pub mod template;

pub use subject::{Actor, Subject};
