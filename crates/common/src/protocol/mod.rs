pub mod frame;
pub mod sync;
