//! Abstract syntax tree for FHIRPath expressions.
//!
//! Every node is immutable after construction; equality and hashing are
//! structural, and `Display` renders a node back to FHIRPath source.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A FHIRPath expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FhirPath {
    /// The outer resource.
    Root,
    /// The current contextual item (`$this`).
    This,
    /// Named field access on the parent.
    Element(String),
    /// Integer indexing of a list; negative counts from the end.
    Index(i64),
    /// Sub-range of a list; wildcard when all three bounds are unset.
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
    },
    /// Ordered composition: evaluate the right side within the scope
    /// produced by the left side.
    Child(Box<FhirPath>, Box<FhirPath>),
    /// Filter by a boolean predicate, evaluated with the candidate item
    /// as the sole focus.
    Where(Box<FhirPath>),
    /// Shorthand for `extension.where(url = <url>)`.
    Extension(String),
    /// Enumerate the set variants of a polymorphic `<base>[x]` element.
    TypeChoice(String),
    /// Set union of two evaluation results (left then right).
    Union(Box<FhirPath>, Box<FhirPath>),
    /// Recursive right-side evaluation within every descendant of the
    /// left side.
    Descendants(Box<FhirPath>, Box<FhirPath>),
    /// Arithmetic, comparison or logical operation.
    BinaryOp {
        op: BinaryOperator,
        left: Box<FhirPath>,
        right: Box<FhirPath>,
    },
    /// Type test (`x is Quantity`).
    Is {
        target: Box<FhirPath>,
        type_name: String,
    },
    /// Builtin function application on a target expression.
    Invocation {
        target: Box<FhirPath>,
        function: Function,
    },
    /// Literal operand.
    Literal(LiteralValue),
    /// Environmental variable (`%resource`).
    EnvVariable(String),
}

impl FhirPath {
    /// Compose `self.child`, applying the parser's canonicalisations:
    /// `This` absorbs on either side and a `Root` on the right resets
    /// the chain.
    pub fn child(self, right: FhirPath) -> FhirPath {
        match (self, right) {
            (FhirPath::This, right) => right,
            (left, FhirPath::This) => left,
            (_, FhirPath::Root) => FhirPath::Root,
            (left, right) => FhirPath::Child(Box::new(left), Box::new(right)),
        }
    }

    /// The wildcard list selector `[*]`.
    pub fn wildcard() -> FhirPath {
        FhirPath::Slice {
            start: None,
            end: None,
            step: None,
        }
    }
}

/// Binary operators, tightest-binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Mul,
    Div,
    Add,
    Sub,
    Concat,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Xor,
    Implies,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Concat => "&",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "!=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Xor => "xor",
            BinaryOperator::Implies => "implies",
        }
    }

    /// True for the short-circuit logical operators.
    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Xor | BinaryOperator::Implies
        )
    }
}

/// A literal operand value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    /// The empty collection `{}`.
    Empty,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Date(String),
    Time(String),
}

impl Eq for LiteralValue {}

impl Hash for LiteralValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            LiteralValue::Empty => 0u8.hash(state),
            LiteralValue::Boolean(b) => (1u8, b).hash(state),
            LiteralValue::Integer(i) => (2u8, i).hash(state),
            LiteralValue::Decimal(d) => (3u8, d.to_bits()).hash(state),
            LiteralValue::String(s) => (4u8, s).hash(state),
            LiteralValue::Date(s) => (5u8, s).hash(state),
            LiteralValue::Time(s) => (6u8, s).hash(state),
        }
    }
}

impl LiteralValue {
    /// The literal as a JSON value for evaluation.
    pub fn to_value(&self) -> Value {
        match self {
            LiteralValue::Empty => Value::Null,
            LiteralValue::Boolean(b) => Value::Bool(*b),
            LiteralValue::Integer(i) => Value::from(*i),
            LiteralValue::Decimal(d) => Value::from(*d),
            LiteralValue::String(s) | LiteralValue::Date(s) | LiteralValue::Time(s) => {
                Value::String(s.clone())
            }
        }
    }
}

/// Builtin functions recognised by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Function {
    First,
    Last,
    Tail,
    Single,
    Skip(Box<FhirPath>),
    Take(Box<FhirPath>),
    Count,
    Distinct,
    IsDistinct,
    Empty,
    Exists(Option<Box<FhirPath>>),
    All(Box<FhirPath>),
    AllTrue,
    AnyTrue,
    AllFalse,
    AnyFalse,
    SubsetOf(Box<FhirPath>),
    SupersetOf(Box<FhirPath>),
    UnionWith(Box<FhirPath>),
    Combine(Box<FhirPath>),
    Intersect(Box<FhirPath>),
    Exclude(Box<FhirPath>),
    Select(Box<FhirPath>),
    OfType(String),
    Iif {
        condition: Box<FhirPath>,
        then: Box<FhirPath>,
        otherwise: Option<Box<FhirPath>>,
    },
    ToString,
    ToInteger,
    ToDecimal,
    ToBoolean,
    ToDate,
    ToDateTime,
    ToTime,
    IndexOf(Box<FhirPath>),
    Substring {
        start: Box<FhirPath>,
        length: Option<Box<FhirPath>>,
    },
    StartsWith(Box<FhirPath>),
    EndsWith(Box<FhirPath>),
    Contains(Box<FhirPath>),
    Upper,
    Lower,
    Replace {
        pattern: Box<FhirPath>,
        substitution: Box<FhirPath>,
    },
    Matches(Box<FhirPath>),
    ReplaceMatches {
        pattern: Box<FhirPath>,
        substitution: Box<FhirPath>,
    },
    Length,
    ToChars,
    Abs,
    Ceiling,
    Floor,
    Round(Option<Box<FhirPath>>),
    Sqrt,
    Truncate,
    Children,
    DescendantsAll,
    Trace(String),
    Now,
    TimeOfDay,
    Today,
    HasValue,
    GetValue,
    Resolve,
    Not,
}

impl Function {
    /// The FHIRPath surface name of the function.
    pub fn name(&self) -> &'static str {
        match self {
            Function::First => "first",
            Function::Last => "last",
            Function::Tail => "tail",
            Function::Single => "single",
            Function::Skip(_) => "skip",
            Function::Take(_) => "take",
            Function::Count => "count",
            Function::Distinct => "distinct",
            Function::IsDistinct => "isDistinct",
            Function::Empty => "empty",
            Function::Exists(_) => "exists",
            Function::All(_) => "all",
            Function::AllTrue => "allTrue",
            Function::AnyTrue => "anyTrue",
            Function::AllFalse => "allFalse",
            Function::AnyFalse => "anyFalse",
            Function::SubsetOf(_) => "subsetOf",
            Function::SupersetOf(_) => "supersetOf",
            Function::UnionWith(_) => "union",
            Function::Combine(_) => "combine",
            Function::Intersect(_) => "intersect",
            Function::Exclude(_) => "exclude",
            Function::Select(_) => "select",
            Function::OfType(_) => "ofType",
            Function::Iif { .. } => "iif",
            Function::ToString => "toString",
            Function::ToInteger => "toInteger",
            Function::ToDecimal => "toDecimal",
            Function::ToBoolean => "toBoolean",
            Function::ToDate => "toDate",
            Function::ToDateTime => "toDateTime",
            Function::ToTime => "toTime",
            Function::IndexOf(_) => "indexOf",
            Function::Substring { .. } => "substring",
            Function::StartsWith(_) => "startsWith",
            Function::EndsWith(_) => "endsWith",
            Function::Contains(_) => "contains",
            Function::Upper => "upper",
            Function::Lower => "lower",
            Function::Replace { .. } => "replace",
            Function::Matches(_) => "matches",
            Function::ReplaceMatches { .. } => "replaceMatches",
            Function::Length => "length",
            Function::ToChars => "toChars",
            Function::Abs => "abs",
            Function::Ceiling => "ceiling",
            Function::Floor => "floor",
            Function::Round(_) => "round",
            Function::Sqrt => "sqrt",
            Function::Truncate => "truncate",
            Function::Children => "children",
            Function::DescendantsAll => "descendants",
            Function::Trace(_) => "trace",
            Function::Now => "now",
            Function::TimeOfDay => "timeOfDay",
            Function::Today => "today",
            Function::HasValue => "hasValue",
            Function::GetValue => "getValue",
            Function::Resolve => "resolve",
            Function::Not => "not",
        }
    }

    fn arguments(&self) -> Vec<String> {
        match self {
            Function::Skip(a)
            | Function::Take(a)
            | Function::All(a)
            | Function::SubsetOf(a)
            | Function::SupersetOf(a)
            | Function::UnionWith(a)
            | Function::Combine(a)
            | Function::Intersect(a)
            | Function::Exclude(a)
            | Function::Select(a)
            | Function::IndexOf(a)
            | Function::StartsWith(a)
            | Function::EndsWith(a)
            | Function::Contains(a)
            | Function::Matches(a) => vec![a.to_string()],
            Function::Exists(Some(a)) | Function::Round(Some(a)) => vec![a.to_string()],
            Function::OfType(name) => vec![name.clone()],
            Function::Trace(name) => vec![format!("'{name}'")],
            Function::Iif {
                condition,
                then,
                otherwise,
            } => {
                let mut args = vec![condition.to_string(), then.to_string()];
                if let Some(e) = otherwise {
                    args.push(e.to_string());
                }
                args
            }
            Function::Substring { start, length } => {
                let mut args = vec![start.to_string()];
                if let Some(l) = length {
                    args.push(l.to_string());
                }
                args
            }
            Function::Replace {
                pattern,
                substitution,
            }
            | Function::ReplaceMatches {
                pattern,
                substitution,
            } => vec![pattern.to_string(), substitution.to_string()],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.arguments().join(", "))
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Empty => write!(f, "{{}}"),
            LiteralValue::Boolean(b) => write!(f, "{b}"),
            LiteralValue::Integer(i) => write!(f, "{i}"),
            LiteralValue::Decimal(d) => write!(f, "{d}"),
            LiteralValue::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            LiteralValue::Date(d) => write!(f, "@{d}"),
            LiteralValue::Time(t) => write!(f, "@T{t}"),
        }
    }
}

/// Wrap an operand in parentheses when needed for an unambiguous
/// rendering.
fn operand(expr: &FhirPath) -> String {
    match expr {
        FhirPath::BinaryOp { .. } | FhirPath::Union(..) | FhirPath::Is { .. } => {
            format!("({expr})")
        }
        _ => expr.to_string(),
    }
}

impl fmt::Display for FhirPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirPath::Root => write!(f, "$"),
            FhirPath::This => write!(f, "$this"),
            FhirPath::Element(name) => write!(f, "{name}"),
            FhirPath::Index(i) => write!(f, "[{i}]"),
            FhirPath::Slice { start, end, step } => {
                if start.is_none() && end.is_none() && step.is_none() {
                    write!(f, "[*]")
                } else {
                    let fmt_bound = |b: &Option<i64>| b.map(|v| v.to_string()).unwrap_or_default();
                    write!(f, "[{}:{}", fmt_bound(start), fmt_bound(end))?;
                    if let Some(s) = step {
                        write!(f, ":{s}")?;
                    }
                    write!(f, "]")
                }
            }
            FhirPath::Child(left, right) => match right.as_ref() {
                FhirPath::Index(_) | FhirPath::Slice { .. } => write!(f, "{left}{right}"),
                _ => write!(f, "{left}.{right}"),
            },
            FhirPath::Where(pred) => write!(f, "where({pred})"),
            FhirPath::Extension(url) => write!(f, "extension('{url}')"),
            FhirPath::TypeChoice(base) => write!(f, "{base}[x]"),
            FhirPath::Union(left, right) => write!(f, "{left} | {right}"),
            FhirPath::Descendants(left, right) => write!(f, "{left}..{right}"),
            FhirPath::BinaryOp { op, left, right } => {
                write!(f, "{} {} {}", operand(left), op.symbol(), operand(right))
            }
            FhirPath::Is { target, type_name } => {
                write!(f, "{} is {type_name}", operand(target))
            }
            FhirPath::Invocation { target, function } => write!(f, "{target}.{function}"),
            FhirPath::Literal(lit) => write!(f, "{lit}"),
            FhirPath::EnvVariable(name) => write!(f, "%{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_canonicalisation() {
        let name = FhirPath::Element("name".to_string());
        assert_eq!(FhirPath::This.child(name.clone()), name);
        assert_eq!(name.clone().child(FhirPath::This), name);
        assert_eq!(name.clone().child(FhirPath::Root), FhirPath::Root);
        let composed = name.clone().child(FhirPath::Element("family".to_string()));
        assert!(matches!(composed, FhirPath::Child(..)));
    }

    #[test]
    fn test_structural_equality_and_hash() {
        use std::collections::HashSet;
        let a = FhirPath::Child(
            Box::new(FhirPath::Root),
            Box::new(FhirPath::Element("name".to_string())),
        );
        let b = FhirPath::Child(
            Box::new(FhirPath::Root),
            Box::new(FhirPath::Element("name".to_string())),
        );
        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_rendering() {
        let expr = FhirPath::Root
            .child(FhirPath::Element("name".to_string()))
            .child(FhirPath::Where(Box::new(FhirPath::BinaryOp {
                op: BinaryOperator::Eq,
                left: Box::new(FhirPath::Element("family".to_string())),
                right: Box::new(FhirPath::Literal(LiteralValue::String("Doe".to_string()))),
            })))
            .child(FhirPath::Element("given".to_string()));
        assert_eq!(expr.to_string(), "$.name.where(family = 'Doe').given");
    }

    #[test]
    fn test_index_rendering() {
        let expr = FhirPath::Element("coding".to_string()).child(FhirPath::Index(0));
        assert_eq!(expr.to_string(), "coding[0]");
        assert_eq!(FhirPath::wildcard().to_string(), "[*]");
    }
}
