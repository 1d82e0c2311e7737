//! S-expression parser for KiCad board files.
//!
//! Grammar:
//!   sexpr  = '(' node* ')'
//!   node   = sexpr | string | symbol
//!   string = '"' [^"]* '"'  (no escape processing)
//!   symbol = [^ \t\n\r()]+
//!
//! The parser is a single pass over the input with an explicit stack of
//! open lists, so nesting depth is bounded by memory rather than the call
//! stack.

use crate::error::{SyntaxError, SyntaxErrorKind};
use log::warn;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    List(Vec<SExpr>),
    Atom(String),
}

impl SExpr {
    /// Leading atom of a list, e.g. `pad` in `(pad "1" ...)`.
    pub fn tag(&self) -> Option<&str> {
        match self {
            SExpr::List(items) => items.first().and_then(|item| item.as_atom()),
            _ => None,
        }
    }

    /// Items following the tag. Empty for atoms.
    pub fn children(&self) -> &[SExpr] {
        match self {
            SExpr::List(items) if !items.is_empty() => &items[1..],
            _ => &[],
        }
    }

    /// Every item of a list, tag included.
    pub fn items(&self) -> &[SExpr] {
        match self {
            SExpr::List(items) => items,
            _ => &[],
        }
    }

    /// First child list tagged `tag`.
    pub fn find(&self, tag: &str) -> Option<&SExpr> {
        self.children().iter().find(|c| c.tag() == Some(tag))
    }

    pub fn find_all(&self, tag: &str) -> Vec<&SExpr> {
        self.children()
            .iter()
            .filter(|c| c.tag() == Some(tag))
            .collect()
    }

    /// `value("layer")` on `(... (layer "F.Cu"))` yields `F.Cu`.
    pub fn value(&self, tag: &str) -> Option<&str> {
        self.find(tag).and_then(|node| node.atom_at(0))
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExpr::Atom(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Atom at `index` among the children, not counting the tag.
    pub fn atom_at(&self, index: usize) -> Option<&str> {
        self.children().get(index).and_then(|v| v.as_atom())
    }

    pub fn f64_at(&self, index: usize) -> Option<f64> {
        self.atom_at(index).and_then(|v| v.parse().ok())
    }
}

fn is_space(b: u8) -> bool {
    b.is_ascii_whitespace()
}

/// An atom must be quoted on output when reading it back bare would not
/// produce the same text.
fn needs_quotes(atom: &str) -> bool {
    atom.is_empty()
        || atom.starts_with('"')
        || atom.bytes().any(|b| is_space(b) || b == b'(' || b == b')')
}

impl fmt::Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExpr::Atom(s) if needs_quotes(s) => write!(f, "\"{s}\""),
            SExpr::Atom(s) => f.write_str(s),
            SExpr::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(is_space) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn error(&self, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError::new(self.pos, kind)
    }

    fn parse_string(&mut self) -> Result<String, SyntaxError> {
        let open = self.pos;
        // Skip opening quote
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'"' {
                let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(text);
            }
            self.pos += 1;
        }
        Err(SyntaxError::new(open, SyntaxErrorKind::UnterminatedString))
    }

    fn parse_symbol(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_space(b) || b == b'(' || b == b')' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error(SyntaxErrorKind::EmptyAtom));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn parse_sexpr(&mut self) -> Result<SExpr, SyntaxError> {
        // (offset of '(', items collected so far) for every list still open
        let mut open: Vec<(usize, Vec<SExpr>)> = Vec::new();
        loop {
            self.skip_whitespace();
            let node = match self.peek() {
                None => {
                    let kind = match open.last() {
                        Some(&(start, _)) => SyntaxErrorKind::UnclosedList { open: start },
                        None => SyntaxErrorKind::UnexpectedEof,
                    };
                    return Err(self.error(kind));
                }
                Some(b'(') => {
                    open.push((self.pos, Vec::new()));
                    self.pos += 1;
                    continue;
                }
                Some(b')') => match open.pop() {
                    Some((_, items)) => {
                        self.pos += 1;
                        SExpr::List(items)
                    }
                    None => return Err(self.error(SyntaxErrorKind::EmptyAtom)),
                },
                Some(b'"') => SExpr::Atom(self.parse_string()?),
                Some(_) => SExpr::Atom(self.parse_symbol()?),
            };
            match open.last_mut() {
                Some((_, items)) => items.push(node),
                None => return Ok(node),
            }
        }
    }
}

/// Parse a single S-expression document from bytes.
///
/// Parsing stops after the root expression; any text following it is
/// logged and ignored.
pub fn parse(input: &[u8]) -> Result<SExpr, SyntaxError> {
    let mut parser = Parser::new(input);
    let root = parser.parse_sexpr()?;
    parser.skip_whitespace();
    if parser.pos < input.len() {
        warn!(
            "Ignoring {} bytes after the root expression (from byte {})",
            input.len() - parser.pos,
            parser.pos
        );
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(s: &str) -> SExpr {
        SExpr::Atom(s.to_string())
    }

    #[test]
    fn test_simple_list() {
        let result = parse(b"(hello world)").unwrap();
        assert_eq!(result.tag(), Some("hello"));
        assert_eq!(result.atom_at(0), Some("world"));
    }

    #[test]
    fn test_nested() {
        let result = parse(b"(a (b 1) (c 2))").unwrap();
        assert_eq!(result.tag(), Some("a"));
        assert_eq!(result.value("b"), Some("1"));
        assert_eq!(result.value("c"), Some("2"));
    }

    #[test]
    fn test_string() {
        let result = parse(b"(layer \"F.Cu\")").unwrap();
        assert_eq!(result.value("layer"), None);
        assert_eq!(result.tag(), Some("layer"));
        assert_eq!(result.atom_at(0), Some("F.Cu"));
    }

    #[test]
    fn test_string_keeps_whitespace_and_parens() {
        let result = parse(b"(net 3 \"/a (b) c\")").unwrap();
        assert_eq!(result.atom_at(1), Some("/a (b) c"));
    }

    #[test]
    fn test_backslash_is_literal() {
        let result = parse(br#"(name "a\b")"#).unwrap();
        assert_eq!(result.atom_at(0), Some(r"a\b"));
    }

    #[test]
    fn test_float() {
        let result = parse(b"(at 100.5 50.3 90)").unwrap();
        assert_eq!(result.f64_at(0), Some(100.5));
        assert_eq!(result.f64_at(1), Some(50.3));
        assert_eq!(result.f64_at(2), Some(90.0));
    }

    #[test]
    fn test_find_all() {
        let result = parse(b"(root (net 0 \"\") (net 1 \"GND\") (net 2 \"VCC\"))").unwrap();
        let nets = result.find_all("net");
        assert_eq!(nets.len(), 3);
        assert_eq!(nets[0].atom_at(1), Some(""));
    }

    #[test]
    fn test_bare_atom_root() {
        assert_eq!(parse(b"  hello \n").unwrap(), atom("hello"));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(parse(b"()").unwrap(), SExpr::List(vec![]));
    }

    #[test]
    fn test_deep_nesting() {
        let depth = 1_000;
        let mut text = "(".repeat(depth);
        text.push('x');
        text.push_str(&")".repeat(depth));
        let tree = parse(text.as_bytes()).unwrap();
        let mut node = &tree;
        for _ in 0..depth {
            node = &node.items()[0];
        }
        assert_eq!(node, &atom("x"));
    }

    #[test]
    fn test_unmatched_open_paren() {
        let input = b"(kicad_pcb (net 1 \"GND\")";
        let err = parse(input).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnclosedList { open: 0 });
        assert_eq!(err.offset, input.len());
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse(b"(net 1 \"GND)").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedString);
        assert_eq!(err.offset, 7);
    }

    #[test]
    fn test_stray_close_paren() {
        let err = parse(b")").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::EmptyAtom);
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_empty_input() {
        let err = parse(b"   ").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_trailing_input_is_ignored() {
        let tree = parse(b"(a b)) (c d)\n").unwrap();
        assert_eq!(tree, SExpr::List(vec![atom("a"), atom("b")]));
        assert_eq!(parse(b"(a b)  \n").unwrap(), tree);
    }

    #[test]
    fn test_reserialize_round_trip() {
        let docs: [&[u8]; 4] = [
            b"(kicad_pcb (version 20221018) (net 0 \"\") (net 1 \"GND\"))",
            b"(a\n\t(b \"with space\") (c \"(paren)\") ab\"c)",
            b"(pad \"1\" smd rect (at 1.5 -2) (size 0.5 0.5) (layers \"F.Cu\" \"F.Paste\"))",
            b"(((x)) () y)",
        ];
        for doc in docs {
            let tree = parse(doc).unwrap();
            let text = tree.to_string();
            assert_eq!(parse(text.as_bytes()).unwrap(), tree, "round trip of {text}");
        }
    }

    #[test]
    fn test_display_quotes_only_when_needed() {
        let tree = parse(b"(layer \"F.Cu\" \"\" \"a b\")").unwrap();
        assert_eq!(tree.to_string(), "(layer F.Cu \"\" \"a b\")");
    }
}
