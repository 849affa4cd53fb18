pub mod clustering;
pub mod frame;
pub mod geometry;
pub mod pixel;
pub mod position_extractor;
pub mod reference;
pub mod region;
