//! FHIRPath parser.
//!
//! Recursive-descent parser over the token stream produced by the lexer.
//! Each precedence level is one `parse_*` layer, tightest binding at the
//! bottom: member access and indexing, unary minus, multiplicative,
//! additive, comparison, union, `and`, then `or`/`xor`/`implies`.

use crate::ast::{BinaryOperator, FhirPath, Function, LiteralValue};
use crate::error::{FhirPathError, FhirPathResult};
use crate::lexer::{FhirPathLexer, Token, TokenKind, TokenValue};

/// FHIRPath expression parser.
pub struct FhirPathParser;

impl FhirPathParser {
    /// Create a new FHIRPath parser.
    pub fn new() -> Self {
        Self
    }

    /// Parse a FHIRPath expression from a string.
    pub fn parse(&self, input: &str) -> FhirPathResult<FhirPath> {
        let tokens = FhirPathLexer::new().tokenize(input)?;
        let mut cursor = TokenCursor::new(tokens);
        let expr = cursor.parse_expression()?;
        match cursor.peek() {
            None => Ok(expr),
            Some(token) => Err(FhirPathError::parse_error(
                token.text(),
                "Unexpected trailing tokens",
            )),
        }
    }

    /// Cheap syntax check: true when the input parses.
    pub fn is_valid(&self, input: &str) -> bool {
        self.parse(input).is_ok()
    }
}

impl Default for FhirPathParser {
    fn default() -> Self {
        Self::new()
    }
}

struct TokenCursor {
    tokens: Vec<Token>,
    position: usize,
}

impl TokenCursor {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_ahead(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.peek().map(|t| t.is_symbol(symbol)).unwrap_or(false) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> FhirPathResult<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("Expected '{symbol}'")))
        }
    }

    fn unexpected(&self, message: &str) -> FhirPathError {
        let token = self
            .peek()
            .map(|t| t.text())
            .unwrap_or_else(|| "<end of input>".to_string());
        FhirPathError::parse_error(token, message)
    }

    // ---- precedence cascade, loosest first -------------------------------

    fn parse_expression(&mut self) -> FhirPathResult<FhirPath> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> FhirPathResult<FhirPath> {
        let mut expr = self.parse_and()?;
        while let Some(op) = self.peek_boolean_op(&["or", "xor", "implies"]) {
            self.advance();
            let right = self.parse_and()?;
            expr = FhirPath::BinaryOp {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> FhirPathResult<FhirPath> {
        let mut expr = self.parse_union()?;
        while self.peek_boolean_op(&["and"]).is_some() {
            self.advance();
            let right = self.parse_union()?;
            expr = FhirPath::BinaryOp {
                op: BinaryOperator::And,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn peek_boolean_op(&self, names: &[&str]) -> Option<BinaryOperator> {
        let token = self.peek()?;
        if token.kind != TokenKind::BooleanOperator {
            return None;
        }
        let name = token.value.as_str()?;
        if !names.contains(&name) {
            return None;
        }
        Some(match name {
            "and" => BinaryOperator::And,
            "or" => BinaryOperator::Or,
            "xor" => BinaryOperator::Xor,
            _ => BinaryOperator::Implies,
        })
    }

    fn parse_union(&mut self) -> FhirPathResult<FhirPath> {
        let mut expr = self.parse_comparison()?;
        while self.eat_symbol('|') {
            let right = self.parse_comparison()?;
            expr = FhirPath::Union(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> FhirPathResult<FhirPath> {
        let mut expr = self.parse_additive()?;
        loop {
            if let Some(token) = self.peek() {
                if token.kind == TokenKind::TypesOperator {
                    let op = token.value.as_str().unwrap_or_default().to_string();
                    self.advance();
                    let type_name = self.parse_type_name()?;
                    expr = match op.as_str() {
                        "is" => FhirPath::Is {
                            target: Box::new(expr),
                            type_name,
                        },
                        // `as` keeps only the matching variants, which is
                        // exactly what ofType() does.
                        _ => FhirPath::Invocation {
                            target: Box::new(expr),
                            function: Function::OfType(type_name),
                        },
                    };
                    continue;
                }
            }
            let op = match self.peek_comparison_op() {
                Some(op) => op,
                None => return Ok(expr),
            };
            let right = self.parse_additive()?;
            expr = FhirPath::BinaryOp {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
    }

    /// Comparison operators arrive as single-character symbol tokens;
    /// `<=`, `>=` and `!=` are recognised by combining adjacent symbols.
    fn peek_comparison_op(&mut self) -> Option<BinaryOperator> {
        let first = self.peek()?;
        if first.kind != TokenKind::Symbol {
            return None;
        }
        let second_eq = self
            .peek_ahead(1)
            .map(|t| t.is_symbol('='))
            .unwrap_or(false);
        let (op, consumed) = match first.value.as_str()? {
            "<" if second_eq => (BinaryOperator::Le, 2),
            ">" if second_eq => (BinaryOperator::Ge, 2),
            "!" if second_eq => (BinaryOperator::Ne, 2),
            "<" => (BinaryOperator::Lt, 1),
            ">" => (BinaryOperator::Gt, 1),
            "=" => (BinaryOperator::Eq, 1),
            _ => return None,
        };
        self.position += consumed;
        Some(op)
    }

    fn parse_type_name(&mut self) -> FhirPathResult<String> {
        match self.advance() {
            Some(token)
                if matches!(
                    token.kind,
                    TokenKind::Identifier | TokenKind::RootNode | TokenKind::Function
                ) =>
            {
                Ok(token.text())
            }
            Some(token) => Err(FhirPathError::parse_error(
                token.text(),
                "Expected a type name",
            )),
            None => Err(FhirPathError::parse_error(
                "<end of input>",
                "Expected a type name",
            )),
        }
    }

    fn parse_additive(&mut self) -> FhirPathResult<FhirPath> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(t) if t.is_symbol('+') => BinaryOperator::Add,
                Some(t) if t.is_symbol('-') => BinaryOperator::Sub,
                Some(t) if t.is_symbol('&') => BinaryOperator::Concat,
                _ => return Ok(expr),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = FhirPath::BinaryOp {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> FhirPathResult<FhirPath> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(t) if t.is_symbol('*') => BinaryOperator::Mul,
                Some(t) if t.is_symbol('/') => BinaryOperator::Div,
                _ => return Ok(expr),
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = FhirPath::BinaryOp {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> FhirPathResult<FhirPath> {
        if self.peek().map(|t| t.is_symbol('-')).unwrap_or(false) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(match operand {
                FhirPath::Literal(LiteralValue::Integer(i)) => {
                    FhirPath::Literal(LiteralValue::Integer(-i))
                }
                FhirPath::Literal(LiteralValue::Decimal(d)) => {
                    FhirPath::Literal(LiteralValue::Decimal(-d))
                }
                other => FhirPath::BinaryOp {
                    op: BinaryOperator::Sub,
                    left: Box::new(FhirPath::Literal(LiteralValue::Integer(0))),
                    right: Box::new(other),
                },
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> FhirPathResult<FhirPath> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_symbol('.') {
                // `left..right` — descendant traversal
                if self.eat_symbol('.') {
                    let right = self.parse_postfix()?;
                    expr = FhirPath::Descendants(Box::new(expr), Box::new(right));
                    continue;
                }
                let segment = self.parse_segment()?;
                expr = match segment {
                    Segment::Path(node) => expr.child(node),
                    Segment::Call(function) => FhirPath::Invocation {
                        target: Box::new(expr),
                        function,
                    },
                };
                continue;
            }
            if self.eat_symbol('[') {
                let selector = self.parse_bracket_selector()?;
                expr = expr.child(selector);
                continue;
            }
            return Ok(expr);
        }
    }

    /// One dotted segment: a field, choice element, wildcard, `$this`
    /// or a function call.
    fn parse_segment(&mut self) -> FhirPathResult<Segment> {
        let token = match self.advance() {
            Some(t) => t,
            None => {
                return Err(FhirPathError::parse_error(
                    "<end of input>",
                    "Expected a path segment after '.'",
                ))
            }
        };
        match token.kind {
            TokenKind::Identifier | TokenKind::RootNode | TokenKind::CalendarDuration => {
                Ok(Segment::Path(FhirPath::Element(token.text())))
            }
            TokenKind::ChoiceElement => Ok(Segment::Path(FhirPath::TypeChoice(token.text()))),
            TokenKind::ContextualOperator if token.value.as_str() == Some("this") => {
                Ok(Segment::Path(FhirPath::This))
            }
            TokenKind::Symbol if token.is_symbol('*') => Ok(Segment::Path(FhirPath::wildcard())),
            // A function name without a call is a plain field access
            // (FHIR has elements like `contains` or `length`)
            TokenKind::Function => {
                if self.peek().map(|t| t.is_symbol('(')).unwrap_or(false) {
                    self.parse_function_call(&token)
                } else {
                    Ok(Segment::Path(FhirPath::Element(token.text())))
                }
            }
            _ => Err(FhirPathError::parse_error(
                token.text(),
                "Unexpected token in path segment",
            )),
        }
    }

    /// `[n]`, `[*]`, `[start:end]` or `[start:end:step]`.
    fn parse_bracket_selector(&mut self) -> FhirPathResult<FhirPath> {
        if self.eat_symbol('*') {
            self.expect_symbol(']')?;
            return Ok(FhirPath::wildcard());
        }

        let start = self.parse_optional_integer()?;
        if self.eat_symbol(']') {
            return match start {
                Some(i) => Ok(FhirPath::Index(i)),
                None => Err(self.unexpected("Expected an index or slice")),
            };
        }

        self.expect_symbol(':')?;
        let end = self.parse_optional_integer()?;
        let step = if self.eat_symbol(':') {
            self.parse_optional_integer()?
        } else {
            None
        };
        self.expect_symbol(']')?;
        Ok(FhirPath::Slice { start, end, step })
    }

    fn parse_optional_integer(&mut self) -> FhirPathResult<Option<i64>> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Integer => {
                let value = match token.value {
                    TokenValue::Int(i) => i,
                    _ => unreachable!("integer token carries an integer value"),
                };
                self.advance();
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    fn parse_primary(&mut self) -> FhirPathResult<FhirPath> {
        let token = match self.advance() {
            Some(t) => t,
            None => {
                return Err(FhirPathError::parse_error(
                    "<end of input>",
                    "Expected an expression",
                ))
            }
        };

        match token.kind {
            TokenKind::Boolean => match token.value {
                TokenValue::Bool(b) => Ok(FhirPath::Literal(LiteralValue::Boolean(b))),
                _ => unreachable!("boolean token carries a boolean value"),
            },
            TokenKind::Integer => match token.value {
                TokenValue::Int(i) => Ok(FhirPath::Literal(LiteralValue::Integer(i))),
                _ => unreachable!("integer token carries an integer value"),
            },
            TokenKind::Decimal => match token.value {
                TokenValue::Dec(d) => Ok(FhirPath::Literal(LiteralValue::Decimal(d))),
                _ => unreachable!("decimal token carries a decimal value"),
            },
            TokenKind::String => Ok(FhirPath::Literal(LiteralValue::String(token.text()))),
            TokenKind::Date => Ok(FhirPath::Literal(LiteralValue::Date(token.text()))),
            TokenKind::Time => Ok(FhirPath::Literal(LiteralValue::Time(token.text()))),
            // A resource-type head collapses to the root node
            TokenKind::RootNode => Ok(FhirPath::Root),
            TokenKind::Identifier | TokenKind::CalendarDuration => {
                Ok(FhirPath::Element(token.text()))
            }
            TokenKind::ChoiceElement => Ok(FhirPath::TypeChoice(token.text())),
            TokenKind::EnvironmentalVariable => Ok(FhirPath::EnvVariable(token.text())),
            TokenKind::ContextualOperator => match token.value.as_str() {
                Some("this") => Ok(FhirPath::This),
                Some("") => Ok(FhirPath::Root),
                Some(other) => Err(FhirPathError::parse_error(
                    format!("${other}"),
                    "Contextual operator is not valid here",
                )),
                None => unreachable!("contextual token carries a string value"),
            },
            TokenKind::Function => {
                if !self.peek().map(|t| t.is_symbol('(')).unwrap_or(false) {
                    return Ok(FhirPath::Element(token.text()));
                }
                // Function applied to the current context, e.g. `first()`
                let segment = self.parse_function_call(&token)?;
                Ok(match segment {
                    Segment::Path(node) => node,
                    Segment::Call(function) => FhirPath::Invocation {
                        target: Box::new(FhirPath::This),
                        function,
                    },
                })
            }
            TokenKind::Symbol if token.is_symbol('(') => {
                let inner = self.parse_expression()?;
                self.expect_symbol(')')?;
                Ok(inner)
            }
            TokenKind::Symbol if token.is_symbol('{') => {
                self.expect_symbol('}')?;
                Ok(FhirPath::Literal(LiteralValue::Empty))
            }
            _ => Err(FhirPathError::parse_error(
                token.text(),
                "Unexpected token at start of expression",
            )),
        }
    }

    /// Parse `name(args...)` into the matching AST shape. `where`,
    /// `extension`, `index` and `single` have dedicated node forms; the
    /// rest become `Invocation` functions.
    fn parse_function_call(&mut self, name_token: &Token) -> FhirPathResult<Segment> {
        let name = name_token.text();
        self.expect_symbol('(')?;

        // Type names are not expressions; ofType() consumes its argument
        // as a bare name before the generic argument loop runs.
        if name == "ofType" {
            let type_name = self.parse_type_name()?;
            self.expect_symbol(')')?;
            return Ok(Segment::Call(Function::OfType(type_name)));
        }

        let mut args = Vec::new();
        if !self.peek().map(|t| t.is_symbol(')')).unwrap_or(false) {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat_symbol(',') {
                    break;
                }
            }
        }
        self.expect_symbol(')')?;

        let arity_error = |expected: &str| {
            FhirPathError::parse_error(name.clone(), format!("{name}() expects {expected}"))
        };

        let mut args = args.into_iter();
        let mut next_arg = || args.next().map(Box::new);

        let function = match name.as_str() {
            "where" => {
                let predicate = next_arg().ok_or_else(|| arity_error("one argument"))?;
                return Ok(Segment::Path(FhirPath::Where(predicate)));
            }
            "extension" => {
                let url = match next_arg().map(|b| *b) {
                    Some(FhirPath::Literal(LiteralValue::String(url))) => url,
                    _ => return Err(arity_error("a URL string literal")),
                };
                return Ok(Segment::Path(FhirPath::Extension(url)));
            }
            "index" => {
                let index = match next_arg().map(|b| *b) {
                    Some(FhirPath::Literal(LiteralValue::Integer(i))) => i,
                    _ => return Err(arity_error("an integer literal")),
                };
                return Ok(Segment::Path(FhirPath::Index(index)));
            }
            "first" => Function::First,
            "last" => Function::Last,
            "tail" => Function::Tail,
            "single" => Function::Single,
            "skip" => Function::Skip(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "take" => Function::Take(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "count" => Function::Count,
            "distinct" => Function::Distinct,
            "isDistinct" => Function::IsDistinct,
            "empty" => Function::Empty,
            "exists" => Function::Exists(next_arg()),
            "all" => Function::All(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "allTrue" => Function::AllTrue,
            "anyTrue" => Function::AnyTrue,
            "allFalse" => Function::AllFalse,
            "anyFalse" => Function::AnyFalse,
            "subsetOf" => Function::SubsetOf(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "supersetOf" => {
                Function::SupersetOf(next_arg().ok_or_else(|| arity_error("one argument"))?)
            }
            "union" => Function::UnionWith(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "combine" => Function::Combine(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "intersect" => {
                Function::Intersect(next_arg().ok_or_else(|| arity_error("one argument"))?)
            }
            "exclude" => Function::Exclude(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "select" => Function::Select(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "iif" => {
                let condition = next_arg().ok_or_else(|| arity_error("two or three arguments"))?;
                let then = next_arg().ok_or_else(|| arity_error("two or three arguments"))?;
                Function::Iif {
                    condition,
                    then,
                    otherwise: next_arg(),
                }
            }
            "toString" => Function::ToString,
            "toInteger" => Function::ToInteger,
            "toDecimal" => Function::ToDecimal,
            "toBoolean" => Function::ToBoolean,
            "toDate" => Function::ToDate,
            "toDateTime" => Function::ToDateTime,
            "toTime" => Function::ToTime,
            "indexOf" => Function::IndexOf(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "substring" => Function::Substring {
                start: next_arg().ok_or_else(|| arity_error("one or two arguments"))?,
                length: next_arg(),
            },
            "startsWith" => {
                Function::StartsWith(next_arg().ok_or_else(|| arity_error("one argument"))?)
            }
            "endsWith" => Function::EndsWith(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "contains" => Function::Contains(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "upper" => Function::Upper,
            "lower" => Function::Lower,
            "replace" => Function::Replace {
                pattern: next_arg().ok_or_else(|| arity_error("two arguments"))?,
                substitution: next_arg().ok_or_else(|| arity_error("two arguments"))?,
            },
            "matches" => Function::Matches(next_arg().ok_or_else(|| arity_error("one argument"))?),
            "replaceMatches" => Function::ReplaceMatches {
                pattern: next_arg().ok_or_else(|| arity_error("two arguments"))?,
                substitution: next_arg().ok_or_else(|| arity_error("two arguments"))?,
            },
            "length" => Function::Length,
            "toChars" => Function::ToChars,
            "abs" => Function::Abs,
            "ceiling" => Function::Ceiling,
            "floor" => Function::Floor,
            "round" => Function::Round(next_arg()),
            "sqrt" => Function::Sqrt,
            "truncate" => Function::Truncate,
            "children" => Function::Children,
            "descendants" => Function::DescendantsAll,
            "trace" => {
                let label = match next_arg().map(|b| *b) {
                    Some(FhirPath::Literal(LiteralValue::String(label))) => label,
                    None => String::new(),
                    _ => return Err(arity_error("a string label")),
                };
                Function::Trace(label)
            }
            "now" => Function::Now,
            "timeOfDay" => Function::TimeOfDay,
            "today" => Function::Today,
            "hasValue" => Function::HasValue,
            "getValue" => Function::GetValue,
            "resolve" => Function::Resolve,
            "not" => Function::Not,
            other => {
                return Err(FhirPathError::parse_error(
                    other,
                    "Function is not supported",
                ))
            }
        };
        Ok(Segment::Call(function))
    }
}

enum Segment {
    Path(FhirPath),
    Call(Function),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> FhirPath {
        FhirPathParser::new()
            .parse(input)
            .unwrap_or_else(|e| panic!("failed to parse {input}: {e}"))
    }

    #[test]
    fn test_simple_member_access() {
        let expr = parse("Patient.name");
        assert_eq!(
            expr,
            FhirPath::Child(
                Box::new(FhirPath::Root),
                Box::new(FhirPath::Element("name".to_string()))
            )
        );
    }

    #[test]
    fn test_where_chain_shape() {
        let expr = parse("Patient.name.where(family='Doe').given");
        let expected = FhirPath::Root
            .child(FhirPath::Element("name".to_string()))
            .child(FhirPath::Where(Box::new(FhirPath::BinaryOp {
                op: BinaryOperator::Eq,
                left: Box::new(FhirPath::Element("family".to_string())),
                right: Box::new(FhirPath::Literal(LiteralValue::String("Doe".to_string()))),
            })))
            .child(FhirPath::Element("given".to_string()));
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_indexing_and_slices() {
        assert_eq!(
            parse("name[0]"),
            FhirPath::Element("name".to_string()).child(FhirPath::Index(0))
        );
        assert_eq!(
            parse("name[-1]"),
            FhirPath::Element("name".to_string()).child(FhirPath::Index(-1))
        );
        assert_eq!(
            parse("name[*]"),
            FhirPath::Element("name".to_string()).child(FhirPath::wildcard())
        );
        assert_eq!(
            parse("name[1:3]"),
            FhirPath::Element("name".to_string()).child(FhirPath::Slice {
                start: Some(1),
                end: Some(3),
                step: None
            })
        );
    }

    #[test]
    fn test_extension_shortcut() {
        assert_eq!(
            parse("Patient.extension('http://x/a')"),
            FhirPath::Root.child(FhirPath::Extension("http://x/a".to_string()))
        );
    }

    #[test]
    fn test_index_function_form() {
        assert_eq!(
            parse("component.index(2)"),
            FhirPath::Element("component".to_string()).child(FhirPath::Index(2))
        );
    }

    #[test]
    fn test_type_choice() {
        assert_eq!(
            parse("Observation.value[x]"),
            FhirPath::Root.child(FhirPath::TypeChoice("value".to_string()))
        );
    }

    #[test]
    fn test_union() {
        let expr = parse("name.given | name.family");
        assert!(matches!(expr, FhirPath::Union(..)));
    }

    #[test]
    fn test_comparison_precedence() {
        // (2 + 3) > 4, not 2 + (3 > 4)
        let expr = parse("2 + 3 > 4");
        match expr {
            FhirPath::BinaryOp { op, left, .. } => {
                assert_eq!(op, BinaryOperator::Gt);
                assert!(matches!(
                    *left,
                    FhirPath::BinaryOp {
                        op: BinaryOperator::Add,
                        ..
                    }
                ));
            }
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_logical_precedence() {
        // union binds tighter than `and`
        let expr = parse("a | b and c.exists()");
        match expr {
            FhirPath::BinaryOp { op, left, .. } => {
                assert_eq!(op, BinaryOperator::And);
                assert!(matches!(*left, FhirPath::Union(..)));
            }
            other => panic!("expected and, got {other:?}"),
        }
    }

    #[test]
    fn test_is_operator() {
        let expr = parse("value is Quantity");
        match expr {
            FhirPath::Is { type_name, .. } => assert_eq!(type_name, "Quantity"),
            other => panic!("expected is, got {other:?}"),
        }
    }

    #[test]
    fn test_exists_with_and_without_criteria() {
        assert!(matches!(
            parse("name.exists()"),
            FhirPath::Invocation {
                function: Function::Exists(None),
                ..
            }
        ));
        assert!(matches!(
            parse("name.exists(use = 'official')"),
            FhirPath::Invocation {
                function: Function::Exists(Some(_)),
                ..
            }
        ));
    }

    #[test]
    fn test_this_canonicalisation() {
        assert_eq!(
            parse("$this.name"),
            FhirPath::Element("name".to_string())
        );
    }

    #[test]
    fn test_parse_errors() {
        let parser = FhirPathParser::new();
        assert!(parser.parse("name.").is_err());
        assert!(parser.parse("name[").is_err());
        assert!(parser.parse("where()").is_err());
        assert!(parser.parse("name )").is_err());
        assert!(!parser.is_valid("single(,)"));
        assert!(parser.is_valid("name.where(use = 'official').first()"));
    }

    #[test]
    fn test_render_parse_round_trip() {
        for source in [
            "name.where(family = 'Doe').given",
            "component[2].valueString",
            "extension('http://x/b').valueString",
            "name.given | name.family",
            "value[x]",
            "code.coding[*].code",
            "status = 'final' and value.exists()",
        ] {
            let expr = FhirPathParser::new().parse(source).unwrap();
            let rendered = expr.to_string();
            let reparsed = FhirPathParser::new().parse(&rendered).unwrap();
            assert_eq!(expr, reparsed, "round trip failed for {source} -> {rendered}");
        }
    }
}
