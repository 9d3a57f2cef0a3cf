//! FHIRPath lexer.
//!
//! Tokenises a FHIRPath source string into a stream of typed lexemes.
//! Whitespace and comments are skipped silently; every emitted token
//! carries the line and column where it started so diagnostics can point
//! at the offending input.

use crate::error::{FhirPathError, FhirPathResult};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1, take_while_m_n},
    character::complete::{char, digit1},
    combinator::{opt, recognize},
    sequence::{pair, preceded, tuple},
    IResult,
};

/// The kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    /// Identifier carrying a `[x]` type-choice suffix (stripped from the value)
    ChoiceElement,
    /// A known base FHIR resource or datatype name
    RootNode,
    /// A reserved function name
    Function,
    /// `and`, `or`, `xor`, `implies`
    BooleanOperator,
    /// `is`, `as`
    TypesOperator,
    /// `year`, `months`, `week`, ... calendar duration keywords
    CalendarDuration,
    Boolean,
    Integer,
    Decimal,
    Date,
    Time,
    String,
    /// `$this`, `$index`, `$total`, bare `$`
    ContextualOperator,
    /// `%resource`, `%context`, ...
    EnvironmentalVariable,
    /// One of `. , + - * / | & = ! > < ( ) { } : [ ]`
    Symbol,
}

/// The value payload of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    Str(String),
    Int(i64),
    Dec(f64),
    Bool(bool),
}

impl TokenValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TokenValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// A single lexeme with its position in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub line: usize,
    pub column: usize,
}

impl Token {
    /// The token's text, as used in diagnostics.
    pub fn text(&self) -> String {
        match &self.value {
            TokenValue::Str(s) => s.clone(),
            TokenValue::Int(i) => i.to_string(),
            TokenValue::Dec(d) => d.to_string(),
            TokenValue::Bool(b) => b.to_string(),
        }
    }

    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == TokenKind::Symbol && self.value.as_str() == Some(&symbol.to_string())
    }
}

/// Reserved function names (http://hl7.org/fhirpath/N1/#functions plus
/// the FHIR additions). An identifier directly followed by `(` must be
/// one of these.
pub const FUNCTION_NAMES: &[&str] = &[
    // Existence
    "empty",
    "exists",
    "all",
    "allTrue",
    "anyTrue",
    "allFalse",
    "anyFalse",
    "subsetOf",
    "supersetOf",
    "count",
    "distinct",
    "isDistinct",
    // Filtering and projection
    "where",
    "select",
    "repeat",
    "ofType",
    // Subsetting
    "first",
    "last",
    "tail",
    "single",
    "skip",
    "take",
    "intersect",
    "exclude",
    "index",
    // Combining
    "union",
    "combine",
    // Conversion
    "iif",
    "toBoolean",
    "convertsToBoolean",
    "toInteger",
    "convertsToInteger",
    "toDate",
    "convertsToDate",
    "toDateTime",
    "convertsToDateTime",
    "toDecimal",
    "convertsToDecimal",
    "toQuantity",
    "convertsToQuantity",
    "toString",
    "convertsToString",
    "toTime",
    "convertsToTime",
    // String manipulation
    "indexOf",
    "substring",
    "startsWith",
    "endsWith",
    "contains",
    "upper",
    "lower",
    "replace",
    "matches",
    "replaceMatches",
    "length",
    "toChars",
    // Math
    "abs",
    "ceiling",
    "exp",
    "floor",
    "ln",
    "log",
    "power",
    "round",
    "sqrt",
    "truncate",
    // Tree navigation
    "children",
    "descendants",
    // Utility
    "trace",
    "now",
    "timeOfDay",
    "today",
    "not",
    // FHIR additions
    "extension",
    "hasValue",
    "getValue",
    "resolve",
];

const CALENDAR_DURATIONS: &[&str] = &[
    "week",
    "weeks",
    "month",
    "months",
    "year",
    "years",
    "day",
    "days",
    "hour",
    "hours",
    "minute",
    "minutes",
    "second",
    "seconds",
    "millisecond",
    "milliseconds",
];

const SYMBOLS: &str = ".,+-*/|&=!><(){}:[]";

/// FHIRPath lexical analyzer.
pub struct FhirPathLexer;

impl FhirPathLexer {
    pub fn new() -> Self {
        Self
    }

    /// Map a source string to its token stream.
    pub fn tokenize(&self, source: &str) -> FhirPathResult<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut cursor = Cursor::new(source);

        loop {
            cursor.skip_trivia()?;
            if cursor.rest().is_empty() {
                break;
            }
            let token = cursor.next_token(tokens.last())?;
            tokens.push(token);
        }

        Ok(tokens)
    }
}

impl Default for FhirPathLexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Scanner state: the remaining input plus position bookkeeping.
struct Cursor<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
    latest_newline: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            latest_newline: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    fn column(&self) -> usize {
        self.offset - self.latest_newline
    }

    fn advance_over(&mut self, consumed: usize) {
        let eaten = &self.source[self.offset..self.offset + consumed];
        for (i, ch) in eaten.char_indices() {
            if ch == '\n' {
                self.line += 1;
                self.latest_newline = self.offset + i + 1;
            }
        }
        self.offset += consumed;
    }

    /// Skip whitespace and `//` / `/* */` comments, tracking newlines.
    fn skip_trivia(&mut self) -> FhirPathResult<()> {
        loop {
            let rest = self.rest();
            if let Some(ch) = rest.chars().next() {
                if ch.is_whitespace() {
                    self.advance_over(ch.len_utf8());
                    continue;
                }
            }
            if rest.starts_with("//") {
                let end = rest.find('\n').unwrap_or(rest.len());
                self.advance_over(end);
                continue;
            }
            if rest.starts_with("/*") {
                match rest.find("*/") {
                    Some(end) => self.advance_over(end + 2),
                    None => {
                        return Err(FhirPathError::lex_error(
                            self.line,
                            self.column(),
                            "Unterminated block comment",
                        ))
                    }
                }
                continue;
            }
            return Ok(());
        }
    }

    fn error(&self, message: impl Into<String>) -> FhirPathError {
        FhirPathError::lex_error(self.line, self.column(), message)
    }

    /// Lex one token from the head of the remaining input.
    fn next_token(&mut self, previous: Option<&Token>) -> FhirPathResult<Token> {
        let rest = self.rest();
        let line = self.line;
        let column = self.column();

        let emit = |kind, value| Token {
            kind,
            value,
            line,
            column,
        };

        // Double-quoted strings are not part of the grammar; reject with
        // a dedicated message before the generic fallthrough.
        if rest.starts_with('"') {
            return Err(self.error("Double-quoted strings are not valid in FHIRPath"));
        }

        if let Ok((next, raw)) = lex_choice_element(rest) {
            let value = raw.trim_start_matches('`').trim_end_matches('`');
            let value = value.trim_end_matches("[x]").to_string();
            self.advance_over(rest.len() - next.len());
            return Ok(emit(TokenKind::ChoiceElement, TokenValue::Str(value)));
        }

        if let Ok((next, name)) = lex_sigil_word('%')(rest) {
            self.advance_over(rest.len() - next.len());
            return Ok(emit(
                TokenKind::EnvironmentalVariable,
                TokenValue::Str(name.to_string()),
            ));
        }

        if let Ok((next, name)) = lex_sigil_word('$')(rest) {
            self.advance_over(rest.len() - next.len());
            return Ok(emit(
                TokenKind::ContextualOperator,
                TokenValue::Str(name.to_string()),
            ));
        }

        if let Ok((next, value)) = lex_time(rest) {
            self.advance_over(rest.len() - next.len());
            return Ok(emit(TokenKind::Time, TokenValue::Str(value)));
        }

        if let Ok((next, value)) = lex_date(rest) {
            self.advance_over(rest.len() - next.len());
            return Ok(emit(TokenKind::Date, TokenValue::Str(value)));
        }

        if let Ok((next, raw)) = lex_number(rest, previous) {
            let consumed = rest.len() - next.len();
            self.advance_over(consumed);
            return if raw.contains('.') {
                let value = raw
                    .parse::<f64>()
                    .map_err(|e| self.error(format!("Invalid decimal literal '{raw}': {e}")))?;
                Ok(emit(TokenKind::Decimal, TokenValue::Dec(value)))
            } else {
                let value = raw
                    .parse::<i64>()
                    .map_err(|e| self.error(format!("Invalid integer literal '{raw}': {e}")))?;
                Ok(emit(TokenKind::Integer, TokenValue::Int(value)))
            };
        }

        if rest.starts_with('\'') {
            let (consumed, value) = self.lex_string(rest)?;
            self.advance_over(consumed);
            return Ok(emit(TokenKind::String, TokenValue::Str(value)));
        }

        if rest.starts_with('`') {
            let (consumed, value) = self.lex_delimited_identifier(rest)?;
            self.advance_over(consumed);
            return Ok(emit(TokenKind::Identifier, TokenValue::Str(value)));
        }

        if let Ok((next, word)) = lex_simple_identifier(rest) {
            let kind = self.classify_word(word, next)?;
            self.advance_over(rest.len() - next.len());
            let value = match word {
                "true" => TokenValue::Bool(true),
                "false" => TokenValue::Bool(false),
                _ => TokenValue::Str(word.to_string()),
            };
            return Ok(Token {
                kind,
                value,
                line,
                column,
            });
        }

        let ch = rest.chars().next().expect("input is non-empty");
        if SYMBOLS.contains(ch) {
            self.advance_over(ch.len_utf8());
            return Ok(emit(TokenKind::Symbol, TokenValue::Str(ch.to_string())));
        }

        Err(self.error(format!("Unexpected character: {ch}")))
    }

    /// Classify a bare word via the reserved tables. A word directly
    /// followed by `(` must be a known function name.
    fn classify_word(&self, word: &str, next: &str) -> FhirPathResult<TokenKind> {
        let followed_by_paren = next.trim_start().starts_with('(');
        if FUNCTION_NAMES.contains(&word) {
            return Ok(TokenKind::Function);
        }
        if followed_by_paren {
            return Err(self.error(format!("Invalid function: \"{word}\"")));
        }
        Ok(match word {
            "true" | "false" => TokenKind::Boolean,
            "and" | "or" | "xor" | "implies" => TokenKind::BooleanOperator,
            "is" | "as" => TokenKind::TypesOperator,
            _ if CALENDAR_DURATIONS.contains(&word) => TokenKind::CalendarDuration,
            _ if hx_datatypes::is_resource_name(word) => TokenKind::RootNode,
            _ => TokenKind::Identifier,
        })
    }

    /// Single-quoted string with backslash escapes. Returns the number of
    /// source bytes consumed and the unescaped content.
    fn lex_string(&self, rest: &str) -> FhirPathResult<(usize, String)> {
        let mut value = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((i, ch)) = chars.next() {
            match ch {
                '\'' => return Ok((i + 1, value)),
                '\\' => match chars.next() {
                    Some((_, escaped)) => value.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    }),
                    None => break,
                },
                other => value.push(other),
            }
        }
        Err(self.error("Unexpected EOF in string literal"))
    }

    /// Backtick-delimited identifier.
    fn lex_delimited_identifier(&self, rest: &str) -> FhirPathResult<(usize, String)> {
        match rest[1..].find('`') {
            Some(end) => Ok((end + 2, rest[1..end + 1].to_string())),
            None => Err(self.error("Unexpected EOF in delimited identifier")),
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn lex_simple_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while_m_n(1, 1, is_identifier_start),
        take_while(is_identifier_char),
    ))(input)
}

/// `name[x]` or `` `name`[x] `` — a type-choice element reference.
fn lex_choice_element(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(tuple((
            char('`'),
            take_while1(|c| c != '`'),
            char('`'),
            tag("[x]"),
        ))),
        recognize(pair(lex_simple_identifier, tag("[x]"))),
    ))(input)
}

/// `$word` or `%word` (the word may be empty, as in a bare `$`).
fn lex_sigil_word(sigil: char) -> impl Fn(&str) -> IResult<&str, &str> {
    move |input: &str| preceded(char(sigil), take_while(is_identifier_char))(input)
}

/// `@YYYY`, `@YYYY-MM` or `@YYYY-MM-DD`, with the `@` stripped.
fn lex_date(input: &str) -> IResult<&str, String> {
    let (input, _) = char('@')(input)?;
    let (input, year) = take_while_m_n(4, 4, |c: char| c.is_ascii_digit())(input)?;
    let (input, month_day) = opt(tuple((
        preceded(char('-'), take_while_m_n(2, 2, |c: char| c.is_ascii_digit())),
        opt(preceded(
            char('-'),
            take_while_m_n(2, 2, |c: char| c.is_ascii_digit()),
        )),
    )))(input)?;

    let value = match month_day {
        Some((month, Some(day))) => format!("{year}-{month}-{day}"),
        Some((month, None)) => format!("{year}-{month}"),
        None => year.to_string(),
    };
    Ok((input, value))
}

/// `@Thh:mm(:ss(.fff)?)?(Z|±hh:mm)?`, with the `@T` stripped.
fn lex_time(input: &str) -> IResult<&str, String> {
    let (input, _) = tag("@T")(input)?;
    let (input, raw) = recognize(tuple((
        take_while_m_n(2, 2, |c: char| c.is_ascii_digit()),
        char(':'),
        take_while_m_n(2, 2, |c: char| c.is_ascii_digit()),
        opt(tuple((
            char(':'),
            take_while_m_n(2, 2, |c: char| c.is_ascii_digit()),
            opt(pair(char('.'), digit1)),
        ))),
        opt(alt((
            recognize(char('Z')),
            recognize(tuple((
                alt((char('+'), char('-'))),
                take_while_m_n(2, 2, |c: char| c.is_ascii_digit()),
                char(':'),
                take_while_m_n(2, 2, |c: char| c.is_ascii_digit()),
            ))),
        ))),
    )))(input)?;
    Ok((input, raw.to_string()))
}

/// A numeric literal. The leading minus is folded into the literal only
/// when the previous token cannot terminate an operand, so `a-1` still
/// lexes as a subtraction.
fn lex_number<'a>(input: &'a str, previous: Option<&Token>) -> IResult<&'a str, &'a str> {
    let minus_allowed = match previous {
        None => true,
        Some(tok) => match tok.kind {
            TokenKind::Symbol => !tok.is_symbol(')') && !tok.is_symbol(']'),
            TokenKind::BooleanOperator | TokenKind::TypesOperator | TokenKind::Function => true,
            _ => false,
        },
    };
    if minus_allowed {
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
        )))(input)
    } else {
        recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        FhirPathLexer::new().tokenize(source).unwrap()
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_symbols() {
        for symbol in [".", ",", "+", "-", "*", "/", "|", "&", "=", ">", "!", "(", ")", "{", "}"] {
            let tokens = lex(symbol);
            assert_eq!(tokens.len(), 1, "one token for {symbol}");
            assert_eq!(tokens[0].kind, TokenKind::Symbol);
            assert_eq!(tokens[0].value, TokenValue::Str(symbol.to_string()));
        }
    }

    #[test]
    fn test_comments_are_skipped() {
        assert!(lex("// comment line").is_empty());
        assert!(lex("/* multiline \n comment */").is_empty());
    }

    #[test]
    fn test_literals() {
        assert_eq!(lex("true")[0].value, TokenValue::Bool(true));
        assert_eq!(lex("false")[0].kind, TokenKind::Boolean);
        assert_eq!(lex("1")[0].value, TokenValue::Int(1));
        assert_eq!(lex(" -13 ")[0].value, TokenValue::Int(-13));
        assert_eq!(lex(" 1.24 ")[0].value, TokenValue::Dec(1.24));
        assert_eq!(lex(" -2.52 ")[0].value, TokenValue::Dec(-2.52));
        assert_eq!(lex("'test string'")[0].value, TokenValue::Str("test string".into()));
    }

    #[test]
    fn test_date_and_time_literals() {
        let token = &lex("@2024-01-02")[0];
        assert_eq!(token.kind, TokenKind::Date);
        assert_eq!(token.value, TokenValue::Str("2024-01-02".into()));
        assert_eq!(lex("@2024-01")[0].value, TokenValue::Str("2024-01".into()));
        assert_eq!(lex("@2024")[0].value, TokenValue::Str("2024".into()));

        let token = &lex("@T14:30:14.559Z")[0];
        assert_eq!(token.kind, TokenKind::Time);
        assert_eq!(token.value, TokenValue::Str("14:30:14.559Z".into()));
        assert_eq!(lex("@T14:30")[0].value, TokenValue::Str("14:30".into()));
    }

    #[test]
    fn test_identifiers() {
        for source in ["parent", "_parent", "parent12", "_12345"] {
            let tokens = lex(source);
            assert_eq!(tokens[0].kind, TokenKind::Identifier);
            assert_eq!(tokens[0].value, TokenValue::Str(source.to_string()));
        }
        assert_eq!(lex("`parent name`")[0].value, TokenValue::Str("parent name".into()));
        assert_eq!(
            kinds("parent.child"),
            vec![TokenKind::Identifier, TokenKind::Symbol, TokenKind::Identifier]
        );
    }

    #[test]
    fn test_choice_element() {
        let token = &lex("value[x]")[0];
        assert_eq!(token.kind, TokenKind::ChoiceElement);
        assert_eq!(token.value, TokenValue::Str("value".into()));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(lex("and")[0].kind, TokenKind::BooleanOperator);
        assert_eq!(lex("implies")[0].kind, TokenKind::BooleanOperator);
        assert_eq!(lex("is")[0].kind, TokenKind::TypesOperator);
        assert_eq!(lex("year")[0].kind, TokenKind::CalendarDuration);
        assert_eq!(lex("where")[0].kind, TokenKind::Function);
        assert_eq!(lex("Observation")[0].kind, TokenKind::RootNode);
        assert_eq!(lex("CodeableConcept")[0].kind, TokenKind::RootNode);
    }

    #[test]
    fn test_contextual_and_environmental() {
        assert_eq!(lex("$this")[0].kind, TokenKind::ContextualOperator);
        assert_eq!(lex("$this")[0].value, TokenValue::Str("this".into()));
        assert_eq!(lex("%resource")[0].kind, TokenKind::EnvironmentalVariable);
    }

    #[test]
    fn test_positions() {
        let tokens = lex("name.\n  family");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].column, 0);
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[2].column, 2);
    }

    #[test]
    fn test_minus_binds_to_literal_only_after_operator() {
        let tokens = lex("a-1");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind, TokenKind::Symbol);
        assert_eq!(tokens[2].value, TokenValue::Int(1));

        let tokens = lex("-1");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value, TokenValue::Int(-1));
    }

    #[test]
    fn test_lexer_errors() {
        let lexer = FhirPathLexer::new();
        for source in ["'unterminated", "`unterminated", "\"double\"", "?", "notAFunction(x)"] {
            assert!(lexer.tokenize(source).is_err(), "expected error for {source}");
        }
    }

    #[test]
    fn test_error_positions() {
        let err = FhirPathLexer::new().tokenize("name.?").unwrap_err();
        match err {
            FhirPathError::LexError { line, column, .. } => {
                assert_eq!(line, 1);
                assert_eq!(column, 5);
            }
            other => panic!("expected lex error, got {other:?}"),
        }
    }
}
