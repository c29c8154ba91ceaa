//! IR model and recursive-descent parser for the Reed language.
//!
//! The parser consumes the token stream produced by `reed-lexer` and builds
//! an owned IR tree: a [`ir::Module`] in whole-file mode (`parse`), or the
//! declarations of one logical line in REPL mode (`parse_line`). The IR is
//! the single program representation between parsing and bytecode emission;
//! the pass pipeline rewrites it in place.

pub mod ir;
pub mod parser;

pub use parser::{LineParse, Parser};
