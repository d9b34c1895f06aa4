//! Text KV parser and writer
//!
//! Handles quoted and bare tokens, nested braces, `//` comments, the usual
//! escape sequences and `[$PLATFORM]` conditionals (which are skipped).

use super::{VdfMap, VdfValue};
use crate::error::VdfError;

/// Parse KV text into its root map.
///
/// Empty input (or input with only comments) gives an empty map; deciding
/// whether that is "no data" is up to the caller.
pub fn decode_text(content: &str) -> Result<VdfMap, VdfError> {
    let mut parser = Parser::new(content);
    parser.parse_map(false)
}

/// Serialize a map in Steam's tab-indented layout
pub fn encode_text(map: &VdfMap) -> String {
    let mut out = String::new();
    write_map(&mut out, map, 0);
    out
}

fn write_map(out: &mut String, map: &VdfMap, depth: usize) {
    let indent = "\t".repeat(depth);
    for (key, value) in map {
        match value {
            VdfValue::Map(child) => {
                out.push_str(&format!("{indent}\"{}\"\n{indent}{{\n", escape(key)));
                write_map(out, child, depth + 1);
                out.push_str(&format!("{indent}}}\n"));
            }
            VdfValue::String(s) => {
                out.push_str(&format!("{indent}\"{}\"\t\t\"{}\"\n", escape(key), escape(s)));
            }
            VdfValue::Int(i) => {
                out.push_str(&format!("{indent}\"{}\"\t\t\"{i}\"\n", escape(key)));
            }
            VdfValue::Float(f) => {
                out.push_str(&format!("{indent}\"{}\"\t\t\"{f}\"\n", escape(key)));
            }
        }
    }
}

fn escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Insert, merging into an existing map when a section appears twice
fn insert_merged(map: &mut VdfMap, key: String, value: VdfValue) {
    match value {
        VdfValue::Map(new) => {
            if let Some(VdfValue::Map(existing)) = map.get_mut(&key) {
                for (k, v) in new {
                    insert_merged(existing, k, v);
                }
                return;
            }
            map.insert(key, VdfValue::Map(new));
        }
        other => {
            map.insert(key, other);
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn new(content: &str) -> Self {
        Self {
            chars: content.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> VdfError {
        VdfError::Malformed {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_second(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Skip whitespace and // comments
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.next_char();
            }

            if self.peek() == Some('/') && self.peek_second() == Some('/') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.next_char();
                }
                continue;
            }

            break;
        }
    }

    /// Skip a `[$WIN32]`-style conditional if one follows
    fn skip_conditional(&mut self) -> Result<(), VdfError> {
        self.skip_whitespace_and_comments();
        if self.peek() != Some('[') {
            return Ok(());
        }
        loop {
            match self.next_char() {
                Some(']') => return Ok(()),
                Some('\n') | None => return Err(self.error("unterminated conditional")),
                Some(_) => {}
            }
        }
    }

    fn parse_map(&mut self, nested: bool) -> Result<VdfMap, VdfError> {
        let mut map = VdfMap::new();

        loop {
            self.skip_whitespace_and_comments();

            match self.peek() {
                None if nested => return Err(self.error("unexpected end of file, missing '}'")),
                None => break,
                Some('}') if nested => {
                    self.next_char();
                    break;
                }
                Some('}') => return Err(self.error("unexpected '}'")),
                Some('{') => return Err(self.error("expected a key, found '{'")),
                Some(_) => {
                    let key = self.parse_token()?;
                    self.skip_conditional()?;
                    self.skip_whitespace_and_comments();

                    let value = match self.peek() {
                        Some('{') => {
                            self.next_char();
                            VdfValue::Map(self.parse_map(true)?)
                        }
                        Some('}') | None => {
                            return Err(self.error(format!("missing value for key '{key}'")))
                        }
                        Some(_) => VdfValue::String(self.parse_token()?),
                    };
                    self.skip_conditional()?;
                    insert_merged(&mut map, key, value);
                }
            }
        }

        Ok(map)
    }

    fn parse_token(&mut self) -> Result<String, VdfError> {
        if self.peek() == Some('"') {
            self.next_char();
            return self.parse_quoted_string();
        }

        let mut token = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | '"') {
                break;
            }
            token.push(c);
            self.next_char();
        }
        Ok(token)
    }

    /// Parse the rest of a quoted string "..."; the opening quote is already consumed
    fn parse_quoted_string(&mut self) -> Result<String, VdfError> {
        let start_line = self.line;
        let mut result = String::new();

        loop {
            match self.next_char() {
                None => {
                    return Err(VdfError::Malformed {
                        line: start_line,
                        message: "unterminated string".into(),
                    })
                }
                Some('"') => break,
                Some('\\') => match self.next_char() {
                    Some('n') => result.push('\n'),
                    Some('t') => result.push('\t'),
                    Some('\\') => result.push('\\'),
                    Some('"') => result.push('"'),
                    Some(c) => {
                        result.push('\\');
                        result.push(c);
                    }
                    None => {
                        return Err(VdfError::Malformed {
                            line: start_line,
                            message: "unterminated string".into(),
                        })
                    }
                },
                Some(c) => result.push(c),
            }
        }

        Ok(result)
    }
}
