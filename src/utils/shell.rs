//! POSIX shell quoting for assembled command lines.

/// Wrap `value` in single quotes, closing and reopening the quoted span
/// around any embedded single quote.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '@' | '%' | '+' | '=' | ',')
}

/// Emit `value` bare when the shell cannot misread it, quoted otherwise.
pub fn shell_word(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_safe_char) {
        value.to_string()
    } else {
        quote(value)
    }
}

/// Lexically normalize a `/`-separated path: collapse repeated separators,
/// drop `.` segments and resolve `..` against preceding segments.
/// The empty path becomes `.`.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Normalize and quote a path for the command line. A path that would start
/// with `-` gets a `./` prefix so it can never be taken for an option.
pub fn quote_path(path: &str) -> String {
    let mut cleaned = clean_path(path);
    if cleaned.starts_with('-') {
        cleaned.insert_str(0, "./");
    }
    quote(&cleaned)
}

/// Double `%` so ssh's `ProxyCommand` token expansion leaves the text alone.
pub fn escape_percent(value: &str) -> String {
    value.replace('%', "%%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_path_normalizes_lexically() {
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("a//b/./c/"), "a/b/c");
        assert_eq!(clean_path("/../etc/passwd"), "/etc/passwd");
        assert_eq!(clean_path("a/../../b"), "../b");
        assert_eq!(clean_path("/srv/app/../data"), "/srv/data");
        assert_eq!(clean_path("./"), ".");
    }

    #[test]
    fn dash_paths_are_prefixed() {
        assert_eq!(quote_path("-rf /"), "'./-rf '");
        assert_eq!(quote_path("--help"), "'./--help'");
        assert_eq!(quote_path("/tmp/-x"), "'/tmp/-x'");
    }

    #[test]
    fn single_quotes_are_escaped() {
        assert_eq!(quote("it's"), r#"'it'"'"'s'"#);
        assert_eq!(quote_path("/tmp/it's here"), r#"'/tmp/it'"'"'s here'"#);
    }

    #[test]
    fn shell_word_only_quotes_when_needed() {
        assert_eq!(shell_word("deploy@10.0.0.1"), "deploy@10.0.0.1");
        assert_eq!(shell_word("a b"), "'a b'");
        assert_eq!(shell_word("$(reboot)"), "'$(reboot)'");
        assert_eq!(shell_word(""), "''");
    }

    #[test]
    fn escape_percent_doubles() {
        assert_eq!(escape_percent("p%h"), "p%%h");
    }

    #[cfg(unix)]
    #[test]
    fn quoted_path_survives_the_shell() {
        let nasty = "/tmp/it's a \"file\" $(echo no) `x`";
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("printf %s {}", quote_path(nasty)))
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), nasty);
    }
}
