pub mod output_index;
pub mod types;

pub use output_index::{Burn, IndexStats, OutputIndex};
