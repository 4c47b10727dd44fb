//! Lexer for script chunks.
//!
//! Built on logos. Comments and long brackets need look-ahead that a regex
//! cannot express, so they are consumed by callbacks that bump the lexer
//! past the closing bracket.

use logos::Logos;
use tandem_sdk::{ScriptError, ScriptResult};

/// Numeric literal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeral {
    /// Integer literal (hex literals wrap around)
    Int(i64),
    /// Float literal, or a decimal integer too large for i64
    Float(f64),
}

/// Errors produced by the token callbacks
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexErrorKind {
    /// No token matches
    #[default]
    Unexpected,
    /// Bad backslash escape inside a quoted string
    InvalidEscape(String),
    /// Long string without a matching close bracket
    UnfinishedLongString,
    /// Numeric literal that cannot be represented
    MalformedNumber,
}

/// A lexing failure with the text it happened near
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("unexpected symbol near '{0}'")]
    UnexpectedSymbol(String),
    #[error("unfinished string near '{0}'")]
    UnfinishedString(String),
    #[error("invalid escape sequence '{0}'")]
    InvalidEscape(String),
    #[error("unfinished long string")]
    UnfinishedLongString,
    #[error("malformed number near '{0}'")]
    MalformedNumber(String),
}

impl LexError {
    fn new(kind: LexErrorKind, near: &str) -> Self {
        match kind {
            LexErrorKind::Unexpected if near.starts_with('"') || near.starts_with('\'') => {
                LexError::UnfinishedString(near.to_string())
            }
            LexErrorKind::Unexpected => LexError::UnexpectedSymbol(near.to_string()),
            LexErrorKind::InvalidEscape(escape) => LexError::InvalidEscape(escape),
            LexErrorKind::UnfinishedLongString => LexError::UnfinishedLongString,
            LexErrorKind::MalformedNumber => LexError::MalformedNumber(near.to_string()),
        }
    }
}

/// Tokens of the script language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r\n\f\v]+")]
pub enum Token {
    #[token("--", lex_comment)]
    Comment,

    // Keywords
    #[token("and")]
    And,
    #[token("break")]
    Break,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elseif")]
    ElseIf,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("if")]
    If,
    #[token("in")]
    In,
    #[token("local")]
    Local,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("repeat")]
    Repeat,
    #[token("return")]
    Return,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("until")]
    Until,
    #[token("while")]
    While,

    // Operators and punctuation
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("#")]
    Hash,
    #[token("==")]
    Eq,
    #[token("~=")]
    NotEq,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Assign,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("..")]
    Concat,
    #[token("...")]
    Ellipsis,

    // Literals
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Name(String),

    #[regex(r"0[xX][0-9a-fA-F]+", lex_hex)]
    #[regex(r"[0-9]+", lex_decimal)]
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", lex_float)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", lex_float)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", lex_float)]
    Number(Numeral),

    #[regex(r#""([^"\\\n]|\\(.|\n))*""#, lex_quoted)]
    #[regex(r#"'([^'\\\n]|\\(.|\n))*'"#, lex_quoted)]
    #[regex(r"\[=*\[", lex_long_string)]
    String(Vec<u8>),

    /// End of input (appended after lexing)
    Eof,
}

impl Token {
    /// Source-like rendering used in "near" diagnostics
    pub fn describe(&self) -> String {
        match self {
            Token::Name(name) => name.clone(),
            Token::String(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Token::Number(Numeral::Int(i)) => i.to_string(),
            Token::Number(Numeral::Float(f)) => f.to_string(),
            Token::Eof => "<eof>".to_string(),
            other => other.symbol().to_string(),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Comment => "--",
            Token::And => "and",
            Token::Break => "break",
            Token::Do => "do",
            Token::Else => "else",
            Token::ElseIf => "elseif",
            Token::End => "end",
            Token::False => "false",
            Token::For => "for",
            Token::Function => "function",
            Token::If => "if",
            Token::In => "in",
            Token::Local => "local",
            Token::Nil => "nil",
            Token::Not => "not",
            Token::Or => "or",
            Token::Repeat => "repeat",
            Token::Return => "return",
            Token::Then => "then",
            Token::True => "true",
            Token::Until => "until",
            Token::While => "while",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::DoubleSlash => "//",
            Token::Percent => "%",
            Token::Caret => "^",
            Token::Hash => "#",
            Token::Eq => "==",
            Token::NotEq => "~=",
            Token::LessEq => "<=",
            Token::GreaterEq => ">=",
            Token::Less => "<",
            Token::Greater => ">",
            Token::Assign => "=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Semicolon => ";",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Concat => "..",
            Token::Ellipsis => "...",
            Token::Name(_) | Token::Number(_) | Token::String(_) | Token::Eof => "",
        }
    }
}

/// A token with the 1-based line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// Token
    pub token: Token,
    /// Line number
    pub line: u32,
}

/// Length of the `[==[` opener at the start of `s`, if any
fn long_bracket_level(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let level = bytes[1..].iter().take_while(|&&b| b == b'=').count();
    if bytes.get(level + 1) == Some(&b'[') {
        Some(level)
    } else {
        None
    }
}

/// Find the `]==]` closer for `level` in `s`, returning (content_end, closer_end)
fn find_long_close(s: &str, level: usize) -> Option<(usize, usize)> {
    let closer = format!("]{}]", "=".repeat(level));
    s.find(&closer).map(|at| (at, at + closer.len()))
}

fn lex_comment(lex: &mut logos::Lexer<Token>) -> logos::Skip {
    let remainder = lex.remainder();
    if let Some(level) = long_bracket_level(remainder) {
        let opener = level + 2;
        match find_long_close(&remainder[opener..], level) {
            Some((_, end)) => lex.bump(opener + end),
            // Unterminated long comment - consume to end
            None => lex.bump(remainder.len()),
        }
    } else {
        let end = remainder.find('\n').unwrap_or(remainder.len());
        lex.bump(end);
    }
    logos::Skip
}

fn lex_long_string(lex: &mut logos::Lexer<Token>) -> Result<Vec<u8>, LexErrorKind> {
    let level = lex.slice().len() - 2;
    let remainder = lex.remainder();
    let (content_end, end) = find_long_close(remainder, level).ok_or(LexErrorKind::UnfinishedLongString)?;
    let mut content = &remainder[..content_end];
    // A newline right after the opener is not part of the string
    if let Some(rest) = content.strip_prefix("\r\n").or_else(|| content.strip_prefix('\n')) {
        content = rest;
    }
    let bytes = content.as_bytes().to_vec();
    lex.bump(end);
    Ok(bytes)
}

fn lex_hex(lex: &mut logos::Lexer<Token>) -> Numeral {
    let value = lex.slice()[2..].bytes().fold(0i64, |acc, digit| {
        let d = (digit as char).to_digit(16).unwrap_or(0) as i64;
        acc.wrapping_mul(16).wrapping_add(d)
    });
    Numeral::Int(value)
}

fn lex_decimal(lex: &mut logos::Lexer<Token>) -> Result<Numeral, LexErrorKind> {
    let text = lex.slice();
    match text.parse::<i64>() {
        Ok(i) => Ok(Numeral::Int(i)),
        Err(_) => text
            .parse::<f64>()
            .map(Numeral::Float)
            .map_err(|_| LexErrorKind::MalformedNumber),
    }
}

fn lex_float(lex: &mut logos::Lexer<Token>) -> Result<Numeral, LexErrorKind> {
    lex.slice()
        .parse::<f64>()
        .map(Numeral::Float)
        .map_err(|_| LexErrorKind::MalformedNumber)
}

fn lex_quoted(lex: &mut logos::Lexer<Token>) -> Result<Vec<u8>, LexErrorKind> {
    let s = lex.slice();
    unescape(&s[1..s.len() - 1])
}

/// Resolve backslash escapes into raw bytes
fn unescape(s: &str) -> Result<Vec<u8>, LexErrorKind> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let escape = *bytes.get(i + 1).ok_or_else(|| LexErrorKind::InvalidEscape("\\".into()))?;
        i += 2;
        match escape {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'\\' => out.push(b'\\'),
            b'"' => out.push(b'"'),
            b'\'' => out.push(b'\''),
            b'\n' => out.push(b'\n'),
            b'z' => {
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
            }
            b'x' => {
                let hex = s.get(i..i + 2).ok_or_else(|| LexErrorKind::InvalidEscape("\\x".into()))?;
                let value =
                    u8::from_str_radix(hex, 16).map_err(|_| LexErrorKind::InvalidEscape(format!("\\x{}", hex)))?;
                out.push(value);
                i += 2;
            }
            b'u' => {
                let rest = &s[i..];
                let close = rest
                    .strip_prefix('{')
                    .and_then(|r| r.find('}'))
                    .ok_or_else(|| LexErrorKind::InvalidEscape("\\u".into()))?;
                let hex = &rest[1..close + 1];
                let ch = u32::from_str_radix(hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| LexErrorKind::InvalidEscape(format!("\\u{{{}}}", hex)))?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                i += close + 2;
            }
            b'0'..=b'9' => {
                let start = i - 1;
                let mut end = start;
                while end < bytes.len() && end < start + 3 && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let value: u32 = s[start..end].parse().unwrap_or(u32::MAX);
                if value > 255 {
                    return Err(LexErrorKind::InvalidEscape(format!("\\{}", &s[start..end])));
                }
                out.push(value as u8);
                i = end;
            }
            other => return Err(LexErrorKind::InvalidEscape(format!("\\{}", other as char))),
        }
    }
    Ok(out)
}

/// Tokenize a chunk; the result always ends with [`Token::Eof`].
pub fn tokenize(source: &str, chunk: &str) -> ScriptResult<Vec<Spanned>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut line = 1u32;
    let mut counted = 0usize;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        line += source[counted..span.start].bytes().filter(|&b| b == b'\n').count() as u32;
        counted = span.start;

        match result {
            Ok(token) => tokens.push(Spanned { token, line }),
            Err(kind) => {
                return Err(ScriptError::Syntax {
                    chunk: chunk.to_string(),
                    line,
                    message: LexError::new(kind, lexer.slice()).to_string(),
                });
            }
        }
    }

    line += source[counted..].bytes().filter(|&b| b == b'\n').count() as u32;
    tokens.push(Spanned { token: Token::Eof, line });
    Ok(tokens)
}
