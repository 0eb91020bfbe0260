//! Emitted-output data model.
//!
//! Generators append [`OutputFragment`]s to the four streams of a
//! [`GeneratorOutput`]. A fragment is either literal text with a formatting
//! mode, or a splice: a placeholder pointing at a child buffer that will be
//! filled (and possibly reset and refilled) once a deferred reference is
//! resolved. Splices keep textual order stable while emission is deferred.
//!
//! Buffers are shared single-threaded through `Rc<RefCell<_>>`; the writer
//! substitutes splice contents in place during serialization.

use std::cell::RefCell;
use std::rc::Rc;

use crate::syntax::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    /// Plain text, space-separated from its neighbours.
    None,
    /// Text followed by a newline.
    NewlineAfter,
    /// Text wrapped in double quotes.
    SurroundWithQuotes,
    /// `(`, with no space on either side.
    OpenParen,
    /// `)`, with no space before.
    CloseParen,
    /// Argument separator; suppresses the leading space.
    ListSeparator,
    /// Statement terminator; suppresses the leading space, newline after.
    EndStatement,
    /// Text run through the variable name converter.
    ConvertVariableName,
    /// Text run through the function name converter.
    ConvertFunctionName,
}

#[derive(Debug, Clone)]
pub enum OutputFragment {
    Text {
        text: String,
        mode: FormatMode,
        /// Token this text originated from, for error mapping. Delimiter
        /// templates start with `None` and are stamped when inserted.
        origin: Option<Token>,
    },
    Splice(SpliceBuffer),
}

/// A shared, refillable child buffer referenced by a splice fragment.
pub type SpliceBuffer = Rc<RefCell<GeneratorOutput>>;

pub fn new_splice_buffer() -> SpliceBuffer {
    Rc::new(RefCell::new(GeneratorOutput::new()))
}

/// Four parallel append-only fragment streams. Only `source` carries
/// splices.
#[derive(Debug, Default)]
pub struct GeneratorOutput {
    pub source: Vec<OutputFragment>,
    pub header: Vec<OutputFragment>,
    pub functions: Vec<OutputFragment>,
    pub imports: Vec<OutputFragment>,
}

impl GeneratorOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all four streams. Splice buffers are reset with this before
    /// being refilled, never reallocated, so fragments pointing at them
    /// stay valid.
    pub fn reset(&mut self) {
        self.source.clear();
        self.header.clear();
        self.functions.clear();
        self.imports.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
            && self.header.is_empty()
            && self.functions.is_empty()
            && self.imports.is_empty()
    }
}

pub fn add_string_output(
    stream: &mut Vec<OutputFragment>,
    text: impl Into<String>,
    mode: FormatMode,
    origin: &Token,
) {
    stream.push(OutputFragment::Text {
        text: text.into(),
        mode,
        origin: Some(origin.clone()),
    });
}

/// Emits a language punctuation fragment whose text is implied by its mode.
pub fn add_lang_token_output(stream: &mut Vec<OutputFragment>, mode: FormatMode, origin: &Token) {
    let text = match mode {
        FormatMode::OpenParen => "(",
        FormatMode::CloseParen => ")",
        FormatMode::EndStatement => ";",
        _ => "",
    };
    add_string_output(stream, text, mode, origin);
}

/// Appends a splice sentinel so the writer knows to inline `buffer` here.
/// Multiple splices keep their sequential order in the stream.
pub fn add_splice_output(stream: &mut Vec<OutputFragment>, buffer: &SpliceBuffer) {
    stream.push(OutputFragment::Splice(buffer.clone()));
}
