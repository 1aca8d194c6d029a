mod result;

pub use result::{BoxCorners, Detection};
