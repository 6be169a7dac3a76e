//! Survey intake: question catalog, category assignment and the record writer.

mod assignment;
mod questions;
mod record_writer;

pub use assignment::*;
pub use questions::*;
pub use record_writer::*;
