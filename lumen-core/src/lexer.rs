use crate::bail_syntax_at;
use crate::error::Result;
use crate::syntax::Span;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till, take_until, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, hex_digit1, multispace1, one_of},
    combinator::{map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Uniform,
    Varying,
    In,
    Out,
    Const,
    Void,
    Vertex,
    Fragment,
    If,
    Else,
    While,
    For,
    Return,
    Discard,
    Break,
    Continue,
    True,
    False,

    // Identifiers and literals
    Identifier(String),
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PlusPlus,
    MinusMinus,
    Dot,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Semicolon,
    Comma,

    // Attributes
    AttributeStart, // #[

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

fn keyword_or_identifier(word: &str) -> Token {
    match word {
        "uniform" => Token::Uniform,
        "varying" => Token::Varying,
        "in" => Token::In,
        "out" => Token::Out,
        "const" => Token::Const,
        "void" => Token::Void,
        "vertex" => Token::Vertex,
        "fragment" => Token::Fragment,
        "if" => Token::If,
        "else" => Token::Else,
        "while" => Token::While,
        "for" => Token::For,
        "return" => Token::Return,
        "discard" => Token::Discard,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "true" => Token::True,
        "false" => Token::False,
        _ => Token::Identifier(word.to_string()),
    }
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("//"), take_till(|c| c == '\n')))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

fn trivia(input: &str) -> IResult<&str, &str> {
    alt((multispace1, line_comment, block_comment))(input)
}

fn parse_word(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        keyword_or_identifier,
    )(input)
}

fn parse_string_literal(input: &str) -> IResult<&str, Token> {
    map(
        delimited(char('"'), take_while(|c| c != '"' && c != '\n'), char('"')),
        |s: &str| Token::StringLiteral(s.to_string()),
    )(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn parse_float_literal(input: &str) -> IResult<&str, Token> {
    map_res(
        alt((
            recognize(tuple((digit1, char('.'), opt(digit1), opt(exponent)))),
            recognize(tuple((char('.'), digit1, opt(exponent)))),
            recognize(pair(digit1, exponent)),
        )),
        |s: &str| s.parse::<f64>().map(Token::FloatLiteral),
    )(input)
}

fn parse_int_literal(input: &str) -> IResult<&str, Token> {
    alt((
        map_res(preceded(alt((tag("0x"), tag("0X"))), hex_digit1), |s: &str| {
            i64::from_str_radix(s, 16).map(Token::IntLiteral)
        }),
        map_res(digit1, |s: &str| s.parse::<i64>().map(Token::IntLiteral)),
    ))(input)
}

fn parse_operator(input: &str) -> IResult<&str, Token> {
    alt((
        alt((
            // Two-character operators must come before their prefixes
            value(Token::PlusPlus, tag("++")),
            value(Token::MinusMinus, tag("--")),
            value(Token::PlusAssign, tag("+=")),
            value(Token::MinusAssign, tag("-=")),
            value(Token::StarAssign, tag("*=")),
            value(Token::SlashAssign, tag("/=")),
            value(Token::EqEq, tag("==")),
            value(Token::NotEq, tag("!=")),
            value(Token::Le, tag("<=")),
            value(Token::Ge, tag(">=")),
            value(Token::AndAnd, tag("&&")),
            value(Token::OrOr, tag("||")),
        )),
        alt((
            value(Token::Plus, char('+')),
            value(Token::Minus, char('-')),
            value(Token::Star, char('*')),
            value(Token::Slash, char('/')),
            value(Token::Percent, char('%')),
            value(Token::Lt, char('<')),
            value(Token::Gt, char('>')),
            value(Token::Bang, char('!')),
            value(Token::Assign, char('=')),
            value(Token::Dot, char('.')),
        )),
    ))(input)
}

fn parse_delimiter(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::AttributeStart, tag("#[")),
        value(Token::LeftParen, char('(')),
        value(Token::RightParen, char(')')),
        value(Token::LeftBracket, char('[')),
        value(Token::RightBracket, char(']')),
        value(Token::LeftBrace, char('{')),
        value(Token::RightBrace, char('}')),
        value(Token::Semicolon, char(';')),
        value(Token::Comma, char(',')),
    ))(input)
}

fn parse_token(input: &str) -> IResult<&str, Token> {
    alt((
        parse_string_literal,
        parse_float_literal,
        parse_int_literal,
        parse_word,
        parse_operator,
        parse_delimiter,
    ))(input)
}

/// Byte offset to line/column conversion for one source buffer.
struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex { source, line_starts }
    }

    fn span_at(&self, offset: usize) -> Span {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        let column = self.source[line_start..offset].chars().count() + 1;
        Span::new(line, column)
    }
}

pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>> {
    let index = LineIndex::new(input);
    let mut remaining = input;
    let mut tokens = Vec::new();

    loop {
        if let Ok((rest, _)) = trivia(remaining) {
            remaining = rest;
            continue;
        }

        let span = index.span_at(input.len() - remaining.len());
        if remaining.is_empty() {
            tokens.push(SpannedToken { token: Token::Eof, span });
            break;
        }
        if remaining.starts_with("/*") {
            bail_syntax_at!(span, "unterminated block comment");
        }

        match parse_token(remaining) {
            Ok((rest, token)) => {
                tokens.push(SpannedToken { token, span });
                remaining = rest;
            }
            Err(_) if remaining.starts_with('"') => {
                bail_syntax_at!(span, "unterminated string literal");
            }
            Err(_) => {
                let c = remaining.chars().next().unwrap_or_default();
                bail_syntax_at!(span, "unexpected character '{}'", c);
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompilerError;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .expect("tokenize failed")
            .into_iter()
            .map(|t| t.token)
            .filter(|t| *t != Token::Eof)
            .collect()
    }

    #[test]
    fn test_tokenize_keywords() {
        assert_eq!(
            kinds("uniform varying in out const void vertex fragment"),
            vec![
                Token::Uniform,
                Token::Varying,
                Token::In,
                Token::Out,
                Token::Const,
                Token::Void,
                Token::Vertex,
                Token::Fragment,
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(
            kinds("vertex_main input iffy"),
            vec![
                Token::Identifier("vertex_main".to_string()),
                Token::Identifier("input".to_string()),
                Token::Identifier("iffy".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_literals() {
        assert_eq!(
            kinds("42 0x1F 1.5 .25 2. 1e3 2.5e-1 true false"),
            vec![
                Token::IntLiteral(42),
                Token::IntLiteral(31),
                Token::FloatLiteral(1.5),
                Token::FloatLiteral(0.25),
                Token::FloatLiteral(2.0),
                Token::FloatLiteral(1000.0),
                Token::FloatLiteral(0.25),
                Token::True,
                Token::False,
            ]
        );
    }

    #[test]
    fn test_tokenize_swizzle_is_not_float() {
        assert_eq!(
            kinds("color.xyz"),
            vec![
                Token::Identifier("color".to_string()),
                Token::Dot,
                Token::Identifier("xyz".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("+ += ++ - -= -- * *= / /= % == != < <= > >= && || ! = ."),
            vec![
                Token::Plus,
                Token::PlusAssign,
                Token::PlusPlus,
                Token::Minus,
                Token::MinusAssign,
                Token::MinusMinus,
                Token::Star,
                Token::StarAssign,
                Token::Slash,
                Token::SlashAssign,
                Token::Percent,
                Token::EqEq,
                Token::NotEq,
                Token::Lt,
                Token::Le,
                Token::Gt,
                Token::Ge,
                Token::AndAnd,
                Token::OrOr,
                Token::Bang,
                Token::Assign,
                Token::Dot,
            ]
        );
    }

    #[test]
    fn test_tokenize_with_comments() {
        let input = "// leading comment\nfloat x; /* block\n comment */ int y;";
        assert_eq!(
            kinds(input),
            vec![
                Token::Identifier("float".to_string()),
                Token::Identifier("x".to_string()),
                Token::Semicolon,
                Token::Identifier("int".to_string()),
                Token::Identifier("y".to_string()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_comment_at_end_of_input() {
        assert_eq!(kinds("x // trailing"), vec![Token::Identifier("x".to_string())]);
    }

    #[test]
    fn test_tokenize_attribute() {
        assert_eq!(
            kinds("#[blend = \"alpha\"]"),
            vec![
                Token::AttributeStart,
                Token::Identifier("blend".to_string()),
                Token::Assign,
                Token::StringLiteral("alpha".to_string()),
                Token::RightBracket,
            ]
        );
    }

    #[test]
    fn test_token_locations() {
        let tokens = tokenize("float a;\n  vec4 b;").unwrap();
        assert_eq!(tokens[0].span, Span::new(1, 1));
        assert_eq!(tokens[1].span, Span::new(1, 7));
        assert_eq!(tokens[3].span, Span::new(2, 3));
        assert_eq!(tokens[4].span, Span::new(2, 8));
        let eof = tokens.last().unwrap();
        assert_eq!(eof.token, Token::Eof);
        assert_eq!(eof.span, Span::new(2, 10));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("float a;\nfloat $b;").unwrap_err();
        match err {
            CompilerError::SyntaxError(msg, span) => {
                assert!(msg.contains('$'), "{msg}");
                assert_eq!(span, Some(Span::new(2, 7)));
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_block_comment() {
        let err = tokenize("x /* never closed").unwrap_err();
        assert!(matches!(err, CompilerError::SyntaxError(_, Some(s)) if s == Span::new(1, 3)));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("#[name = \"oops]").unwrap_err();
        assert!(matches!(err, CompilerError::SyntaxError(ref m, _) if m.contains("string")));
    }
}
