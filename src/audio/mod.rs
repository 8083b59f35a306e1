pub mod analyser;
pub mod analysis;
pub mod decode;
pub mod element;
pub mod features;
pub mod graph;
