//! Shell quoting for displaying command lines in plans and errors.

/// Quote a single argument so the printed line can be pasted into a shell.
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Printable form of a direct program invocation.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(quote_arg(program))
        .chain(args.iter().map(|a| quote_arg(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_args_are_unquoted() {
        assert_eq!(quote_arg("uglifyjs"), "uglifyjs");
        assert_eq!(quote_arg("dist/public/fei.js"), "dist/public/fei.js");
    }

    #[test]
    fn globs_and_spaces_are_quoted() {
        assert_eq!(quote_arg("public/*.js"), "'public/*.js'");
        assert_eq!(quote_arg("hello world"), "'hello world'");
        assert_eq!(quote_arg("it's"), "'it'\\''s'");
        assert_eq!(quote_arg(""), "''");
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let args = vec!["--config".to_string(), "public/.jshintrc".to_string(), "a b.js".to_string()];
        assert_eq!(
            command_line("jshint", &args),
            "jshint --config public/.jshintrc 'a b.js'"
        );
    }
}
