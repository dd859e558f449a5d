use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use super::FormulaError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Text(String),
    /// Plain identifier or `{braced reference}`.
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    OpenParen,
    CloseParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(number) => write!(f, "{number}"),
            Token::Text(text) => write!(f, "'{text}'"),
            Token::Ident(name) => f.write_str(name),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
        }
    }
}

/// Tokens paired with the byte offset they start at.
pub(super) fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let mut lexer = Lexer {
        source,
        chars: source.char_indices().peekable(),
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl Lexer<'_> {
    fn next_token(&mut self) -> Result<Option<(Token, usize)>, FormulaError> {
        while self.chars.next_if(|(_, ch)| ch.is_whitespace()).is_some() {}

        let Some(&(position, ch)) = self.chars.peek() else {
            return Ok(None);
        };

        let token = match ch {
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '(' => self.single(Token::OpenParen),
            ')' => self.single(Token::CloseParen),
            '\'' | '"' => self.string(position, ch)?,
            '{' => self.reference(position)?,
            '0'..='9' | '.' => self.number(position)?,
            ch if ch.is_ascii_alphabetic() || ch == '_' => self.identifier(position),
            found => return Err(FormulaError::UnexpectedChar { found, position }),
        };
        Ok(Some((token, position)))
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn identifier(&mut self, start: usize) -> Token {
        let mut end = start;
        while let Some((offset, ch)) = self
            .chars
            .next_if(|(_, ch)| ch.is_ascii_alphanumeric() || *ch == '_')
        {
            end = offset + ch.len_utf8();
        }
        Token::Ident(self.source[start..end].to_string())
    }

    fn number(&mut self, start: usize) -> Result<Token, FormulaError> {
        let mut end = start;
        let mut previous = '\0';
        while let Some((offset, ch)) = self.chars.next_if(|(_, ch)| {
            ch.is_ascii_digit()
                || *ch == '.'
                || *ch == 'e'
                || *ch == 'E'
                || ((*ch == '+' || *ch == '-') && matches!(previous, 'e' | 'E'))
        }) {
            previous = ch;
            end = offset + ch.len_utf8();
        }
        let text = &self.source[start..end];
        match text.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(Token::Number(number)),
            _ => Err(FormulaError::InvalidNumber {
                text: text.to_string(),
                position: start,
            }),
        }
    }

    fn string(&mut self, start: usize, quote: char) -> Result<Token, FormulaError> {
        self.chars.next();
        let mut text = String::new();
        loop {
            match self.chars.next() {
                Some((_, ch)) if ch == quote => return Ok(Token::Text(text)),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => text.push('\n'),
                    Some((_, 't')) => text.push('\t'),
                    Some((_, escaped)) => text.push(escaped),
                    None => break,
                },
                Some((_, ch)) => text.push(ch),
                None => break,
            }
        }
        Err(FormulaError::UnterminatedString { position: start })
    }

    fn reference(&mut self, start: usize) -> Result<Token, FormulaError> {
        self.chars.next();
        let mut name = String::new();
        for (_, ch) in self.chars.by_ref() {
            if ch == '}' {
                let name = name.trim();
                if name.is_empty() {
                    return Err(FormulaError::EmptyReference { position: start });
                }
                return Ok(Token::Ident(name.to_string()));
            }
            name.push(ch);
        }
        Err(FormulaError::UnterminatedReference { position: start })
    }
}
