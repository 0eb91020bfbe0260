//! Lisp-style name to C identifier conversion.
//!
//! Pure character-level transformation; no knowledge of scoping or
//! reserved words beyond making the result a valid identifier.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyleMode {
    /// `my-favorite-fn` → `my_favorite_fn`
    Underscores,
    /// `my-favorite-fn` → `myFavoriteFn`
    CamelCase,
    /// `my-favorite-fn` → `MyFavoriteFn`
    PascalCase,
}

#[derive(Debug, Clone, Copy)]
pub struct NameStyleSettings {
    pub variable_mode: NameStyleMode,
    pub function_mode: NameStyleMode,
    /// Used for build artifact and loaded symbol names, which must agree
    /// between the transpile and load stages.
    pub artifact_mode: NameStyleMode,
}

impl Default for NameStyleSettings {
    fn default() -> Self {
        Self {
            variable_mode: NameStyleMode::Underscores,
            function_mode: NameStyleMode::Underscores,
            artifact_mode: NameStyleMode::Underscores,
        }
    }
}

/// Converts a lisp name into a C identifier in the requested style.
/// Characters C cannot carry become underscores; a leading digit is
/// prefixed so the result always parses as an identifier.
pub fn lisp_name_to_c_name(mode: NameStyleMode, name: &str) -> String {
    let mut converted = String::with_capacity(name.len());
    let mut capitalize_next = matches!(mode, NameStyleMode::PascalCase);

    for character in name.chars() {
        if character == '-' {
            match mode {
                NameStyleMode::Underscores => converted.push('_'),
                NameStyleMode::CamelCase | NameStyleMode::PascalCase => capitalize_next = true,
            }
            continue;
        }

        let sanitized = if character.is_ascii_alphanumeric() || character == '_' {
            character
        } else {
            '_'
        };

        if capitalize_next {
            converted.extend(sanitized.to_uppercase());
            capitalize_next = false;
        } else {
            converted.push(sanitized);
        }
    }

    if converted
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit())
    {
        converted.insert(0, '_');
    }

    converted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underscore_style() {
        assert_eq!(
            lisp_name_to_c_name(NameStyleMode::Underscores, "my-favorite-fn"),
            "my_favorite_fn"
        );
        assert_eq!(
            lisp_name_to_c_name(NameStyleMode::Underscores, "empty?"),
            "empty_"
        );
    }

    #[test]
    fn camel_and_pascal_styles() {
        assert_eq!(
            lisp_name_to_c_name(NameStyleMode::CamelCase, "my-favorite-fn"),
            "myFavoriteFn"
        );
        assert_eq!(
            lisp_name_to_c_name(NameStyleMode::PascalCase, "my-favorite-fn"),
            "MyFavoriteFn"
        );
    }

    #[test]
    fn leading_digits_are_guarded() {
        assert_eq!(lisp_name_to_c_name(NameStyleMode::Underscores, "3d-point"), "_3d_point");
    }
}
