//! Tokenizer.

use crate::error::{RealmError, RealmResult};

/// Punctuators, longest first so greedy matching works.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=", "*=", "{",
    "}", "(", ")", "[", "]", ";", ",", ".", "<", ">", "+", "-", "*", "/", "%", "=", "!", "?",
    ":",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

pub(crate) fn tokenize(src: &str) -> RealmResult<Vec<Token>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i = i.saturating_add(1);
            continue;
        }

        if c == b'/' && bytes.get(i.saturating_add(1)) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i = i.saturating_add(1);
            }
            continue;
        }

        if c == b'/' && bytes.get(i.saturating_add(1)) == Some(&b'*') {
            let close = src[i.saturating_add(2)..]
                .find("*/")
                .ok_or_else(|| RealmError::Syntax("unterminated comment".to_owned()))?;
            i = i.saturating_add(close).saturating_add(4);
            continue;
        }

        let start = i;

        if c.is_ascii_digit() || (c == b'.' && bytes.get(i.saturating_add(1)).is_some_and(u8::is_ascii_digit)) {
            let (value, end) = lex_number(src, i)?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                start,
                end,
            });
            i = end;
            continue;
        }

        if c == b'"' || c == b'\'' {
            let (value, end) = lex_string(src, i)?;
            tokens.push(Token {
                kind: TokenKind::Str(value),
                start,
                end,
            });
            i = end;
            continue;
        }

        if c == b'`' {
            return Err(RealmError::Syntax(
                "template literals are not supported".to_owned(),
            ));
        }

        if is_ident_start(c) {
            let mut end = i;
            while end < bytes.len() && is_ident_part(bytes[end]) {
                end = end.saturating_add(1);
            }
            tokens.push(Token {
                kind: TokenKind::Ident(src[i..end].to_owned()),
                start,
                end,
            });
            i = end;
            continue;
        }

        let rest = &src[i..];
        let punct = PUNCTUATORS
            .iter()
            .find(|p| rest.starts_with(**p))
            .ok_or_else(|| {
                RealmError::Syntax(format!(
                    "unexpected character '{}'",
                    rest.chars().next().unwrap_or('?')
                ))
            })?;
        let end = i.saturating_add(punct.len());
        tokens.push(Token {
            kind: TokenKind::Punct(punct),
            start,
            end,
        });
        i = end;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        start: src.len(),
        end: src.len(),
    });
    Ok(tokens)
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$'
}

fn is_ident_part(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

fn lex_number(src: &str, start: usize) -> RealmResult<(f64, usize)> {
    let bytes = src.as_bytes();
    let mut end = start;

    if bytes[start] == b'0' && matches!(bytes.get(start.saturating_add(1)), Some(b'x' | b'X')) {
        end = start.saturating_add(2);
        while end < bytes.len() && bytes[end].is_ascii_hexdigit() {
            end = end.saturating_add(1);
        }
        let digits = &src[start.saturating_add(2)..end];
        let value = u64::from_str_radix(digits, 16)
            .map_err(|_| RealmError::Syntax(format!("invalid hex literal '{}'", &src[start..end])))?;
        return Ok((value as f64, end));
    }

    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end = end.saturating_add(1);
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end = end.saturating_add(1);
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end = end.saturating_add(1);
        }
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp = end.saturating_add(1);
        if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
            exp = exp.saturating_add(1);
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            end = exp;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end = end.saturating_add(1);
            }
        }
    }

    let text = &src[start..end];
    let value = text
        .parse::<f64>()
        .map_err(|_| RealmError::Syntax(format!("invalid number literal '{text}'")))?;
    Ok((value, end))
}

fn lex_string(src: &str, start: usize) -> RealmResult<(String, usize)> {
    let quote = src.as_bytes()[start] as char;
    let mut out = String::new();
    let mut chars = src[start.saturating_add(1)..].char_indices();

    while let Some((offset, c)) = chars.next() {
        if c == quote {
            let end = start.saturating_add(1).saturating_add(offset).saturating_add(1);
            return Ok((out, end));
        }
        if c == '\n' {
            break;
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some((_, escaped)) = chars.next() else {
            break;
        };
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'u' => {
                let mut code = String::new();
                for _ in 0..4 {
                    if let Some((_, h)) = chars.next() {
                        code.push(h);
                    }
                }
                let parsed = u32::from_str_radix(&code, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| RealmError::Syntax(format!("invalid unicode escape '\\u{code}'")))?;
                out.push(parsed);
            },
            other => out.push(other),
        }
    }

    Err(RealmError::Syntax("unterminated string literal".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenizes_class_header() {
        assert_eq!(
            kinds("class A extends B {}"),
            vec![
                TokenKind::Ident("class".into()),
                TokenKind::Ident("A".into()),
                TokenKind::Ident("extends".into()),
                TokenKind::Ident("B".into()),
                TokenKind::Punct("{"),
                TokenKind::Punct("}"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_greedy_punctuators_and_comments() {
        assert_eq!(
            kinds("a !== b // trailing\n/* block */ c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Punct("!=="),
                TokenKind::Ident("b".into()),
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_and_strings() {
        assert_eq!(
            kinds("0x10 1.5e2 'a\\nb'"),
            vec![
                TokenKind::Number(16.0),
                TokenKind::Number(150.0),
                TokenKind::Str("a\nb".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_rejects_templates() {
        assert!(matches!(tokenize("`x`"), Err(RealmError::Syntax(_))));
    }
}
