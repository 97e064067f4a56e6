//! Shell quoting for diagnostics
//!
//! Commands are never run through a shell; quoting only makes logged command lines
//! copy-pasteable.

/// Quote a string only if it contains characters with special meaning in a shell
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '=' | '/' | '.' | ':' | ','))
    {
        return s.to_string();
    }

    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("osascript"), "osascript");
        assert_eq!(shell_quote("/tmp/wallpaper space.png"), "'/tmp/wallpaper space.png'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("--format=json"), "--format=json");
    }
}
