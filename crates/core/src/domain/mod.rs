pub mod context;
pub mod interaction;
pub mod product;
pub mod style;
