// Quality report module
// Figure rendering, the HTML document and the fixed step sequence

pub mod document;
pub mod sections;
pub mod svg;

pub use document::{Report, ReportError, Section};
pub use sections::{build_report, SECTION_ORDER};
