pub mod call;
pub mod session;
pub mod target;
pub mod task;
