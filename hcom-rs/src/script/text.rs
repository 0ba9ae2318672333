//! Lexical helpers shared by the dispatcher, the evaluator and the statement
//! parser.  Everything here works on raw line text; quotes are double quotes
//! only and are never unescaped.

/// Split command arguments on spaces, keeping `"quoted text"` together.
/// Quotes stay in the returned tokens.
pub fn split_command_arguments(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_str = false;
    for ch in s.chars() {
        match ch {
            '"' => {
                in_str = !in_str;
                current.push(ch);
            }
            c if c.is_whitespace() && !in_str => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Split on `sep` outside quotes and outside parentheses.  Parts are trimmed;
/// an empty input gives no parts.
pub fn split_respecting(s: &str, sep: char) -> Vec<String> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_str = false;
    let mut depth = 0i32;
    for ch in s.chars() {
        match ch {
            '"' => {
                in_str = !in_str;
                current.push(ch);
            }
            '(' if !in_str => {
                depth += 1;
                current.push(ch);
            }
            ')' if !in_str => {
                depth -= 1;
                current.push(ch);
            }
            c if c == sep && !in_str && depth == 0 => {
                out.push(current.trim().to_owned());
                current.clear();
            }
            c => current.push(c),
        }
    }
    out.push(current.trim().to_owned());
    out
}

/// Whether `ch` occurs outside double quotes.
pub fn contains_unquoted(s: &str, ch: char) -> bool {
    let mut in_str = false;
    for c in s.chars() {
        if c == '"' {
            in_str = !in_str;
        } else if c == ch && !in_str {
            return true;
        }
    }
    false
}

/// Trim and collapse whitespace runs outside quotes to one space.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_str = false;
    let mut pending_space = false;
    for ch in s.trim().chars() {
        if ch == '"' {
            in_str = !in_str;
        }
        if ch.is_whitespace() && !in_str {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

/// Byte index of the `)` matching the `(` at `open`.
pub fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_str = false;
    for (i, ch) in s.char_indices().skip_while(|(i, _)| *i < open) {
        match ch {
            '"' => in_str = !in_str,
            '(' if !in_str => depth += 1,
            ')' if !in_str => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove enclosing parentheses while the outer pair matches.
pub fn strip_redundant_parens(s: &str) -> &str {
    let mut s = s.trim();
    while s.starts_with('(') && matching_paren(s, 0) == Some(s.len() - 1) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

/// `name(args)` with the call's parentheses spanning the rest of the text.
pub fn split_call(expr: &str) -> Option<(&str, &str)> {
    let expr = expr.trim();
    let open = expr.find('(')?;
    let name = expr[..open].trim_end();
    let mut chars = name.chars();
    if !chars.next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }
    (matching_paren(expr, open)? == expr.len() - 1).then(|| (name, &expr[open + 1..expr.len() - 1]))
}

/// Strip one pair of surrounding double quotes.
pub fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// `[A-Za-z][A-Za-z0-9_.:@]*`
pub fn is_valid_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().map_or(false, |c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '@'))
}

/// Split off the first whitespace-delimited word; `("", "")` for blank text.
pub fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Whether every `(` has a matching `)`, ignoring quoted text.
pub fn parens_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut in_str = false;
    for ch in s.chars() {
        match ch {
            '"' => in_str = !in_str,
            '(' if !in_str => depth += 1,
            ')' if !in_str => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_arguments_keep_quotes() {
        assert_eq!(
            split_command_arguments(r#"-i "hello  world" x"#),
            vec!["-i", "\"hello  world\"", "x"]
        );
        assert!(split_command_arguments("   ").is_empty());
    }

    #[test]
    fn respecting_split() {
        assert_eq!(split_respecting("a, f(b, c), \"x,y\"", ','), vec!["a", "f(b, c)", "\"x,y\""]);
        assert_eq!(split_respecting("x=1; print \"a;b\"", ';'), vec!["x=1", "print \"a;b\""]);
        assert!(split_respecting("", ',').is_empty());
        assert_eq!(split_respecting("a,", ','), vec!["a", ""]);
    }

    #[test]
    fn redundant_parens() {
        assert_eq!(strip_redundant_parens("((1+2))"), "1+2");
        assert_eq!(strip_redundant_parens("(1)+(2)"), "(1)+(2)");
        assert_eq!(strip_redundant_parens(" x "), "x");
    }

    #[test]
    fn call_split() {
        assert_eq!(split_call("ddt(a, t)"), Some(("ddt", "a, t")));
        assert_eq!(split_call("f(a)+g(b)"), None);
        assert_eq!(split_call("(a)"), None);
        assert_eq!(split_call("rand()"), Some(("rand", "")));
        assert_eq!(split_call("a.b(1)"), None);
    }

    #[test]
    fn whitespace_collapse_respects_quotes() {
        assert_eq!(collapse_whitespace("  chpa   a.b \t 3 "), "chpa a.b 3");
        assert_eq!(collapse_whitespace("print \"a  b\""), "print \"a  b\"");
    }

    #[test]
    fn variable_names() {
        assert!(is_valid_variable_name("x"));
        assert!(is_valid_variable_name("Mass.P1.x@2"));
        assert!(!is_valid_variable_name("2x"));
        assert!(!is_valid_variable_name("a b"));
        assert!(!is_valid_variable_name(""));
    }

    #[test]
    fn misc() {
        assert!(contains_unquoted("a;b", ';'));
        assert!(!contains_unquoted("\"a;b\"", ';'));
        assert_eq!(unquote("\"x y\""), "x y");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(split_word("  goto  end "), ("goto", "end "));
        assert!(parens_balanced("f(a(b))"));
        assert!(!parens_balanced(")("));
    }
}
