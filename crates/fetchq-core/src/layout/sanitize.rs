//! Path-component sanitization for Linux filesystems.

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Make `name` safe to use as a single path component.
///
/// NUL, `/`, `\`, control characters and whitespace become `_`; runs of `_`
/// collapse; leading/trailing dots, spaces and underscores are trimmed; the
/// result is cut to 255 bytes on a char boundary. May return an empty string.
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let c = if c == '\0' || c == '/' || c == '\\' || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut take = trimmed.len().min(NAME_MAX);
    while take > 0 && !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

/// True if `name` is usable verbatim as a directory name (owner ids).
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && sanitize_component(name) == name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_and_controls_become_underscores() {
        assert_eq!(sanitize_component("a/b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_component("file\x00name.txt"), "file_name.txt");
        assert_eq!(sanitize_component("my scene  01.tif"), "my_scene_01.tif");
    }

    #[test]
    fn trims_dots_and_underscores() {
        assert_eq!(sanitize_component("  ..  file.txt  ..  "), "file.txt");
        assert_eq!(sanitize_component(".."), "");
        assert_eq!(sanitize_component("___"), "");
    }

    #[test]
    fn long_names_cut_on_char_boundary() {
        let name = "é".repeat(200);
        let s = sanitize_component(&name);
        assert!(s.len() <= 255);
        assert!(s.chars().all(|c| c == 'é'));
    }

    #[test]
    fn safe_components() {
        assert!(is_safe_component("alice"));
        assert!(is_safe_component("team-42"));
        assert!(!is_safe_component(""));
        assert!(!is_safe_component(".."));
        assert!(!is_safe_component("a/b"));
        assert!(!is_safe_component("bob "));
    }
}
