//! Serialization of [`GeneratorOutput`] to target-language text.
//!
//! Splice fragments are substituted in place, recursively, so deferred
//! emission never disturbs textual order. Formatting is mode-driven and
//! intentionally simple: plain fragments are space-separated, parentheses
//! and separators suppress the spaces a C reader would not expect.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::converters::{lisp_name_to_c_name, NameStyleSettings};
use crate::diagnostics::SconeError;
use crate::output::{FormatMode, GeneratorOutput, OutputFragment};

#[derive(Debug, Default)]
pub struct WriterOutputSettings {
    pub source_output_path: PathBuf,
    /// Written only when the header stream is non-empty.
    pub header_output_path: Option<PathBuf>,
    pub source_heading: Option<String>,
    pub source_footer: Option<String>,
}

/// Serializes imports, functions, then source. The header stream is left
/// for `write_generator_output` to route to its own file.
pub fn write_output_to_string(output: &GeneratorOutput, names: &NameStyleSettings) -> String {
    let mut text = String::new();
    let mut needs_space = false;
    serialize_fragments(&mut text, &output.imports, names, &mut needs_space);
    serialize_fragments(&mut text, &output.functions, names, &mut needs_space);
    serialize_fragments(&mut text, &output.source, names, &mut needs_space);
    text
}

fn serialize_fragments(
    text: &mut String,
    fragments: &[OutputFragment],
    names: &NameStyleSettings,
    needs_space: &mut bool,
) {
    for fragment in fragments {
        match fragment {
            OutputFragment::Splice(buffer) => {
                // Inline the child buffer's source stream at this position.
                let child = buffer.borrow();
                serialize_fragments(text, &child.source, names, needs_space);
            }
            OutputFragment::Text { text: raw, mode, .. } => {
                serialize_text(text, raw, *mode, names, needs_space);
            }
        }
    }
}

fn serialize_text(
    text: &mut String,
    raw: &str,
    mode: FormatMode,
    names: &NameStyleSettings,
    needs_space: &mut bool,
) {
    match mode {
        FormatMode::None => {
            push_separated(text, raw, needs_space);
        }
        FormatMode::NewlineAfter => {
            push_separated(text, raw, needs_space);
            text.push('\n');
            *needs_space = false;
        }
        FormatMode::SurroundWithQuotes => {
            if *needs_space {
                text.push(' ');
            }
            text.push('"');
            text.push_str(raw);
            text.push('"');
            *needs_space = true;
        }
        FormatMode::OpenParen => {
            text.push('(');
            *needs_space = false;
        }
        FormatMode::CloseParen => {
            text.push(')');
            *needs_space = true;
        }
        FormatMode::ListSeparator => {
            text.push_str(raw);
            *needs_space = false;
        }
        FormatMode::EndStatement => {
            text.push_str(raw);
            text.push('\n');
            *needs_space = false;
        }
        FormatMode::ConvertVariableName => {
            push_separated(text, &lisp_name_to_c_name(names.variable_mode, raw), needs_space);
        }
        FormatMode::ConvertFunctionName => {
            push_separated(text, &lisp_name_to_c_name(names.function_mode, raw), needs_space);
        }
    }
}

fn push_separated(text: &mut String, raw: &str, needs_space: &mut bool) {
    if *needs_space {
        text.push(' ');
    }
    text.push_str(raw);
    *needs_space = true;
}

/// Writes `content` to `path` only when it differs from what is already on
/// disk, preserving the mtime of unchanged artifacts so build caching can
/// compare against it.
pub fn write_if_changed(path: &Path, content: &str) -> io::Result<()> {
    if let Ok(existing) = fs::read_to_string(path) {
        if existing == content {
            return Ok(());
        }
    }
    fs::write(path, content)
}

/// Writes the final source file (and header, when present) for a module.
pub fn write_generator_output(
    output: &GeneratorOutput,
    names: &NameStyleSettings,
    settings: &WriterOutputSettings,
) -> Result<(), SconeError> {
    let mut text = String::new();
    if let Some(heading) = &settings.source_heading {
        text.push_str(heading);
    }
    text.push_str(&write_output_to_string(output, names));
    if let Some(footer) = &settings.source_footer {
        text.push_str(footer);
    }

    write_if_changed(&settings.source_output_path, &text).map_err(|error| {
        SconeError::io(
            format!(
                "failed to write {}",
                settings.source_output_path.display()
            ),
            error,
        )
    })?;

    if !output.header.is_empty() {
        if let Some(header_path) = &settings.header_output_path {
            let mut header_text = String::new();
            let mut needs_space = false;
            serialize_fragments(&mut header_text, &output.header, names, &mut needs_space);
            write_if_changed(header_path, &header_text).map_err(|error| {
                SconeError::io(format!("failed to write {}", header_path.display()), error)
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{
        add_lang_token_output, add_splice_output, add_string_output, new_splice_buffer,
    };
    use crate::syntax::Token;

    #[test]
    fn spacing_follows_modes() {
        let token = Token::internal("t");
        let mut output = GeneratorOutput::new();
        add_string_output(&mut output.source, "f", FormatMode::ConvertFunctionName, &token);
        add_lang_token_output(&mut output.source, FormatMode::OpenParen, &token);
        add_string_output(&mut output.source, "1", FormatMode::None, &token);
        add_string_output(&mut output.source, ", ", FormatMode::ListSeparator, &token);
        add_string_output(&mut output.source, "2", FormatMode::None, &token);
        add_lang_token_output(&mut output.source, FormatMode::CloseParen, &token);
        add_lang_token_output(&mut output.source, FormatMode::EndStatement, &token);

        let text = write_output_to_string(&output, &NameStyleSettings::default());
        assert_eq!(text, "f(1, 2);\n");
    }

    #[test]
    fn splices_are_inlined_in_order_and_follow_refills() {
        let token = Token::internal("t");
        let mut output = GeneratorOutput::new();
        add_string_output(&mut output.source, "before", FormatMode::None, &token);
        let splice = new_splice_buffer();
        add_splice_output(&mut output.source, &splice);
        add_string_output(&mut output.source, "after", FormatMode::None, &token);

        let names = NameStyleSettings::default();
        assert_eq!(write_output_to_string(&output, &names), "before after");

        add_string_output(
            &mut splice.borrow_mut().source,
            "middle",
            FormatMode::None,
            &token,
        );
        assert_eq!(write_output_to_string(&output, &names), "before middle after");

        splice.borrow_mut().reset();
        add_string_output(
            &mut splice.borrow_mut().source,
            "replaced",
            FormatMode::None,
            &token,
        );
        assert_eq!(
            write_output_to_string(&output, &names),
            "before replaced after"
        );
    }
}
