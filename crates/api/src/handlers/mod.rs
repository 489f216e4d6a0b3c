pub mod concept;
pub mod debug;
pub mod video;
