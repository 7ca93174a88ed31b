pub mod error;
pub mod storage;
pub mod sync;

pub use error::Error;
pub use storage::encdec::{DecodingError, DecodingResult};
pub use sync::{
    index::{IndexStats, OutputIndex},
    parser::{BsqParser, Genesis, ParserConfig, ResolutionReport, ScanSummary},
};
