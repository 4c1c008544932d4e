pub mod ks;
pub mod recorder;

pub use ks::ks_test;
pub use recorder::{Recorder, StateSnapshot};
