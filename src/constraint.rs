//! Build constraints: `//go:build` expressions, legacy `// +build` lines,
//! and `_GOOS`/`_GOARCH` file-name suffixes.

use crate::context::{BuildContext, KNOWN_ARCH, KNOWN_OS};
use crate::error::{MockError, Result};
use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Tag(String),
    Not(Box<Constraint>),
    And(Box<Constraint>, Box<Constraint>),
    Or(Box<Constraint>, Box<Constraint>),
}

impl Constraint {
    pub fn eval(&self, matches: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Constraint::Tag(tag) => matches(tag),
            Constraint::Not(inner) => !inner.eval(matches),
            Constraint::And(lhs, rhs) => lhs.eval(matches) && rhs.eval(matches),
            Constraint::Or(lhs, rhs) => lhs.eval(matches) || rhs.eval(matches),
        }
    }

    fn and(lhs: Constraint, rhs: Constraint) -> Constraint {
        Constraint::And(Box::new(lhs), Box::new(rhs))
    }

    fn or(lhs: Constraint, rhs: Constraint) -> Constraint {
        Constraint::Or(Box::new(lhs), Box::new(rhs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    Not,
    And,
    Or,
    LParen,
    RParen,
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn tokenize(expr: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(format!("invalid syntax at {c}"));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            c if is_tag_char(c) => {
                let mut tag = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_tag_char(c) {
                        break;
                    }
                    tag.push(c);
                    chars.next();
                }
                tokens.push(Token::Tag(tag));
            }
            other => return Err(format!("invalid syntax at {other}")),
        }
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or(&mut self) -> std::result::Result<Constraint, String> {
        let mut expr = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            expr = Constraint::or(expr, self.and()?);
        }
        Ok(expr)
    }

    fn and(&mut self) -> std::result::Result<Constraint, String> {
        let mut expr = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            expr = Constraint::and(expr, self.not()?);
        }
        Ok(expr)
    }

    fn not(&mut self) -> std::result::Result<Constraint, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Constraint::Not(Box::new(self.not()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> std::result::Result<Constraint, String> {
        match self.next() {
            Some(Token::Tag(tag)) => Ok(Constraint::Tag(tag)),
            Some(Token::LParen) => {
                let expr = self.or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err("missing )".to_string()),
                }
            }
            Some(Token::RParen) => Err("unexpected )".to_string()),
            Some(_) => Err("unexpected operator".to_string()),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// Parses the expression following `//go:build`.
pub fn parse_expr(expr: &str) -> std::result::Result<Constraint, String> {
    let mut parser = ExprParser {
        tokens: tokenize(expr)?,
        pos: 0,
    };
    let constraint = parser.or()?;
    if parser.pos != parser.tokens.len() {
        return Err("unexpected token after expression".to_string());
    }
    Ok(constraint)
}

/// Parses the fields after `+build`: spaces are OR, commas are AND.
pub fn parse_plus_build(fields: &str) -> std::result::Result<Constraint, String> {
    let mut result: Option<Constraint> = None;
    for field in fields.split_whitespace() {
        let mut clause: Option<Constraint> = None;
        for term in field.split(',') {
            let (negated, tag) = match term.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, term),
            };
            if tag.is_empty() || !tag.chars().all(is_tag_char) {
                return Err(format!("invalid +build term {term:?}"));
            }
            let mut atom = Constraint::Tag(tag.to_string());
            if negated {
                atom = Constraint::Not(Box::new(atom));
            }
            clause = Some(match clause {
                Some(prev) => Constraint::and(prev, atom),
                None => atom,
            });
        }
        if let Some(clause) = clause {
            result = Some(match result {
                Some(prev) => Constraint::or(prev, clause),
                None => clause,
            });
        }
    }
    result.ok_or_else(|| "empty +build line".to_string())
}

/// The directive-bearing part of a Go file.
#[derive(Debug, Default)]
pub struct FileHeader {
    pub go_build: Vec<String>,
    pub plus_build: Vec<String>,
    pub imports_c: bool,
}

fn go_build_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^//go:build(?:\s+(.*))?$").expect("valid regex"))
}

fn plus_build_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^//\s*\+build(?:\s+(.*))?$").expect("valid regex"))
}

fn import_c_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^(?:import\s+)?(?:[\w.]+\s+)?"C"\s*(?:;\s*)?$"#).expect("valid regex"))
}

fn top_level_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(func|type|var|const)\b").expect("valid regex"))
}

/// Reads the leading comment block, stopping at the first line of code. When
/// `scan_imports` is set, the import section is also scanned for `"C"`.
pub fn read_header<R: BufRead>(reader: R, scan_imports: bool) -> io::Result<FileHeader> {
    let mut header = FileHeader::default();
    let mut comments: Vec<String> = Vec::new();
    let mut before_blank = 0;
    let mut in_block = false;
    let mut lines = reader.lines();

    for line in lines.by_ref() {
        let line = line?;
        let trimmed = line.trim();
        if in_block {
            if let Some(idx) = trimmed.find("*/") {
                in_block = false;
                if !trimmed[idx + 2..].trim().is_empty() {
                    break;
                }
            }
            continue;
        }
        if trimmed.is_empty() {
            before_blank = comments.len();
            continue;
        }
        if trimmed.starts_with("//") {
            comments.push(trimmed.to_string());
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("/*") {
            match rest.find("*/") {
                Some(idx) if rest[idx + 2..].trim().is_empty() => continue,
                Some(_) => break,
                None => {
                    in_block = true;
                    continue;
                }
            }
        }
        break;
    }

    for (idx, comment) in comments.iter().enumerate() {
        if let Some(caps) = go_build_re().captures(comment) {
            header
                .go_build
                .push(caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default());
        } else if idx < before_blank {
            if let Some(caps) = plus_build_re().captures(comment) {
                header
                    .plus_build
                    .push(caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default());
            }
        }
    }

    if scan_imports {
        for line in lines {
            let line = line?;
            let trimmed = line.trim();
            if top_level_decl_re().is_match(trimmed) {
                break;
            }
            if import_c_re().is_match(trimmed) {
                header.imports_c = true;
                break;
            }
        }
    }

    Ok(header)
}

impl FileHeader {
    /// The effective constraint; `//go:build` wins over `+build` lines.
    pub fn constraint(&self) -> std::result::Result<Option<Constraint>, String> {
        match self.go_build.as_slice() {
            [] => {}
            [expr] => return parse_expr(expr).map(Some),
            _ => return Err("multiple //go:build comments".to_string()),
        }
        let mut result: Option<Constraint> = None;
        for line in &self.plus_build {
            let clause = parse_plus_build(line)?;
            result = Some(match result {
                Some(prev) => Constraint::and(prev, clause),
                None => clause,
            });
        }
        Ok(result)
    }
}

/// Applies the `_GOOS`, `_GOARCH` and `_GOOS_GOARCH` file-name conventions.
pub fn good_os_arch_file(ctx: &BuildContext, name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    let Some(idx) = stem.find('_') else {
        return true;
    };
    let mut parts: Vec<&str> = stem[idx..].split('_').collect();
    if parts.last() == Some(&"test") {
        parts.pop();
    }
    let n = parts.len();
    if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
        return ctx.match_tag(parts[n - 2]) && ctx.match_tag(parts[n - 1]);
    }
    if n >= 1 && (KNOWN_OS.contains(&parts[n - 1]) || KNOWN_ARCH.contains(&parts[n - 1])) {
        return ctx.match_tag(parts[n - 1]);
    }
    true
}

pub fn match_file(ctx: &BuildContext, dir: &Path, name: &str) -> Result<bool> {
    if name.starts_with('_') || name.starts_with('.') {
        return Ok(false);
    }
    if !good_os_arch_file(ctx, name) {
        return Ok(false);
    }

    let path = dir.join(name);
    let read_err = |source| MockError::ReadFile {
        path: path.clone(),
        source,
    };
    let file = File::open(&path).map_err(read_err)?;
    let header = read_header(BufReader::new(file), !ctx.cgo_enabled).map_err(read_err)?;

    let constraint = header.constraint().map_err(|message| MockError::Filter {
        file: path.clone(),
        message,
    })?;
    if let Some(constraint) = constraint {
        if !constraint.eval(&|tag| ctx.match_tag(tag)) {
            return Ok(false);
        }
    }
    if header.imports_c && !ctx.cgo_enabled {
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn linux() -> BuildContext {
        BuildContext::new("linux", "amd64")
    }

    fn eval(expr: &str, ctx: &BuildContext) -> bool {
        parse_expr(expr)
            .expect("valid expression")
            .eval(&|tag| ctx.match_tag(tag))
    }

    #[test]
    fn go_build_precedence() {
        let ctx = linux();
        assert!(eval("linux && amd64", &ctx));
        assert!(eval("windows || linux && !arm", &ctx));
        assert!(!eval("(windows || darwin) && amd64", &ctx));
        assert!(eval("!integration", &ctx));
        assert!(eval("go1.18", &ctx));
    }

    #[test]
    fn go_build_syntax_errors() {
        assert!(parse_expr("").is_err());
        assert!(parse_expr("linux &").is_err());
        assert!(parse_expr("(linux").is_err());
        assert!(parse_expr("linux)").is_err());
        assert!(parse_expr("linux darwin").is_err());
        assert!(parse_expr("linux && $").is_err());
    }

    #[test]
    fn plus_build_fields() {
        let ctx = linux();
        let c = parse_plus_build("darwin,amd64 linux,!386").expect("parse");
        assert!(c.eval(&|t| ctx.match_tag(t)));
        let c = parse_plus_build("ignore").expect("parse");
        assert!(!c.eval(&|t| ctx.match_tag(t)));
        assert!(parse_plus_build("!!linux").is_err());
        assert!(parse_plus_build("linux,").is_err());
    }

    #[test]
    fn header_stops_at_package_clause() {
        let src = "// Copyright notice\n\n//go:build integration\n\npackage pkg\n\n//go:build ignore\n";
        let header = read_header(Cursor::new(src), false).expect("read");
        assert_eq!(header.go_build, vec!["integration"]);
    }

    #[test]
    fn plus_build_needs_blank_line() {
        let src = "// +build linux\npackage pkg\n";
        let header = read_header(Cursor::new(src), false).expect("read");
        assert!(header.plus_build.is_empty());

        let src = "// +build linux\n// +build amd64\n\npackage pkg\n";
        let header = read_header(Cursor::new(src), false).expect("read");
        assert_eq!(header.plus_build, vec!["linux", "amd64"]);
    }

    #[test]
    fn go_build_wins_over_plus_build() {
        let src = "//go:build windows\n// +build linux\n\npackage pkg\n";
        let header = read_header(Cursor::new(src), false).expect("read");
        let constraint = header.constraint().expect("valid").expect("present");
        assert!(!constraint.eval(&|t| linux().match_tag(t)));
    }

    #[test]
    fn multiple_go_build_lines_are_rejected() {
        let src = "//go:build linux\n//go:build amd64\n\npackage pkg\n";
        let header = read_header(Cursor::new(src), false).expect("read");
        assert!(header.constraint().is_err());
    }

    #[test]
    fn block_comments_are_part_of_the_header() {
        let src = "/*\n * License text\n */\n\n//go:build ignore\n\npackage pkg\n";
        let header = read_header(Cursor::new(src), false).expect("read");
        assert_eq!(header.go_build, vec!["ignore"]);
    }

    #[test]
    fn detects_cgo_imports() {
        let src = "package pkg\n\n// #include <stdio.h>\nimport \"C\"\n\nfunc Foo() {}\n";
        assert!(read_header(Cursor::new(src), true).expect("read").imports_c);

        let src = "package pkg\n\nimport (\n\t\"fmt\"\n\t\"C\"\n)\n";
        assert!(read_header(Cursor::new(src), true).expect("read").imports_c);

        let src = "package pkg\n\nfunc Foo() { _ = \"C\" }\n";
        assert!(!read_header(Cursor::new(src), true).expect("read").imports_c);
    }

    #[test]
    fn file_name_suffixes() {
        let ctx = linux();
        assert!(good_os_arch_file(&ctx, "a.go"));
        assert!(good_os_arch_file(&ctx, "linux.go"));
        assert!(good_os_arch_file(&ctx, "a_linux.go"));
        assert!(good_os_arch_file(&ctx, "a_linux_amd64.go"));
        assert!(good_os_arch_file(&ctx, "a_amd64.go"));
        assert!(!good_os_arch_file(&ctx, "a_windows.go"));
        assert!(!good_os_arch_file(&ctx, "a_linux_arm64.go"));
        assert!(!good_os_arch_file(&ctx, "a_darwin_amd64.go"));
        assert!(good_os_arch_file(&ctx, "a_helper.go"));
        assert!(!good_os_arch_file(&ctx, "a_windows_test.go"));
    }
}
