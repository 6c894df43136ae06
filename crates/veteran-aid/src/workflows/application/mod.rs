//! Application letters: prompting, parsing the generated text and rendering it to PDF.

pub mod fonts;
pub mod layout;
pub mod naming;
pub mod oracle;
pub mod parser;
pub mod pdf;
pub mod prompt;

pub use fonts::{BuiltinFont, FontError, FontFace, FontSet, TrueTypeFont};
pub use layout::{DrawOp, FontWeight, Labels, Page, PageGeometry, TextMeasure, TextRun};
pub use naming::{application_file_name, case_application_file_name, slugify};
pub use oracle::{OpenAiOracle, OracleError, TextOracle};
pub use parser::ParsedApplication;
pub use pdf::{PdfRenderer, RenderError, RenderedDocument};
