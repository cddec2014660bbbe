//! SQL front end of the reference host
//!
//! Lexer, AST and recursive-descent parser for the host's query dialect.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::Statement;
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::Token;
