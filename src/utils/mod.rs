pub mod math;
pub mod normalizer;
pub mod sort;
pub mod time;
