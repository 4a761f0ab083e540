pub mod layer;
pub mod list;
