//! # FHIRPath parser and mutating evaluator
//!
//! This crate provides parsing and evaluation of FHIRPath expressions
//! against FHIR resources represented as `serde_json::Value` documents.
//! Beyond plain navigation it supports a *create* mode in which
//! evaluating a path materialises the missing fields and list slots it
//! addresses, which is what the profile runtime uses to pre-populate
//! constrained resources.
//!
//! ## Example
//!
//! ```rust
//! use hx_fhirpath::{FhirPathEngine, FhirPathParser};
//! use serde_json::json;
//!
//! let parser = FhirPathParser::new();
//! let engine = FhirPathEngine::new();
//!
//! let expr = parser.parse("Observation.component[2].valueString").unwrap();
//! let mut observation = json!({"resourceType": "Observation"});
//! engine.update_or_create(&expr, &mut observation, json!("c")).unwrap();
//! assert_eq!(observation["component"].as_array().unwrap().len(), 3);
//! ```

pub mod ast;
pub mod collection;
pub mod error;
pub mod evaluator;
mod functions;
pub mod lexer;
pub mod parser;
pub mod utils;

// Re-export the main public types users need
pub use ast::{BinaryOperator, FhirPath, Function, LiteralValue};
pub use collection::{write_value, PathItem, Selector};
pub use error::{FhirPathError, FhirPathResult};
pub use evaluator::{EvalMode, EvaluationContext, FhirPathEngine, ReferenceResolver};
pub use lexer::{FhirPathLexer, Token, TokenKind, TokenValue};
pub use parser::FhirPathParser;
pub use utils::{join_fhirpath, split_fhirpath};
