use logos::Logos;
use std::ops::Range;

use crate::error::{ParseError, ParseResult};

fn marker_name<'src>(slice: &'src str) -> &'src str {
    // Strip the leading backslash; nested markers keep their '+'.
    &slice[1..]
}

fn end_marker_name<'src>(slice: &'src str) -> &'src str {
    // Strip the leading backslash and the trailing '*'.
    &slice[1..slice.len() - 1]
}

/// Token types for the USFM marker stream
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token<'src> {
    // Closing marker: \add* \f* \+nd*
    #[regex(r"\\\+?[a-z0-9-]+\*", |lex| end_marker_name(lex.slice()))]
    EndMarker(&'src str),

    // Opening marker: \p \v \add \+nd
    #[regex(r"\\\+?[a-z0-9-]+", |lex| marker_name(lex.slice()))]
    Marker(&'src str),

    // Milestone close: \*
    #[token("\\*")]
    MilestoneEnd,

    // Attribute separator inside character markers
    #[token("|")]
    Pipe,

    // Everything between markers, whitespace included
    #[regex(r"[^\\|]+")]
    Text(&'src str),
}

/// Tokenize a marker stream, surfacing unrecognized input as a parse
/// failure at its byte offset.
pub fn tokenize(source: &str) -> ParseResult<Vec<(Token<'_>, Range<usize>)>> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(ParseError::LexerError { pos: span.start }),
        }
    }

    Ok(tokens)
}
