pub mod duration;
pub mod id;
pub mod iprange;
pub mod types;
