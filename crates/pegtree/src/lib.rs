//! pegtree is a combinator-style PEG parsing engine. A grammar is declared
//! once as a tree of composed elements — literals, character ranges,
//! sequences, ordered and unordered choices, repetitions, predicates,
//! assignments, actions and rule references — and parsing an input produces
//! a lossless concrete syntax tree plus, for parser rules, a typed AST
//! populated by the assignment directives. When the input does not match,
//! an error-recovery phase may delete stray codepoints, insert missing
//! punctuation or repair one-edit typos, reporting every edit as a
//! diagnostic.
//!
//! ## Example
//!
//! ```rust
//! use pegtree::grammar::{kw, s, some, GrammarBuilder};
//! use pegtree::SkipperBuilder;
//!
//! let mut g = GrammarBuilder::new();
//! let ws = g.terminal::<String>("WS");
//! g.define(ws, some(s()));
//! let greeting = g.data_type::<String>("Greeting");
//! g.define(greeting, kw("hello") + kw("world"));
//! let grammar = g.finish();
//!
//! let skipper = SkipperBuilder::new().ignore(ws).build();
//! let result = greeting.parse(&grammar, "hello  world", &skipper);
//! assert!(result.ret);
//! assert_eq!(result.value.as_deref(), Some("helloworld"));
//! ```
//!
//! Parser rules bind features of typed AST nodes; see [`assign!`],
//! [`append!`], [`action!`] and the `tests/` grammars for full examples.

pub mod ast;
pub mod cst;
mod error;
pub mod grammar;
pub mod parser;
mod rules;
mod text;

pub use crate::error::ValueError;
pub use crate::parser::{
    Diagnostic, DiagnosticKind, GenericParseResult, MatchResult, ParseOptions, ParseResult,
    Skipper, SkipperBuilder,
};
pub use crate::rules::{DataTypeRule, ParserRule, TerminalRule};
