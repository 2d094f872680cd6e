pub mod cache;
pub mod color;
pub mod commands;
pub mod id;
pub mod io;
pub mod queue;
pub mod state;
pub mod util;

pub use id::RuntimeID;
