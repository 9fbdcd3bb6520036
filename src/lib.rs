//! Bootstrap compiler for Prose, a minimal keyword-based expression
//! language in which operators and control flow are spelled as plain
//! English words.
//!
//! The pipeline has three synchronous stages, each total except for fast
//! failure on the first malformed input:
//! - [`frontend::lexer`] turns source text into a flat token list.
//! - [`frontend::parser`] builds one [`frontend::ast::Program`] by
//!   recursive descent with explicit operator-precedence layering.
//! - [`backend`] lowers the tree to textual LLVM IR for an external native
//!   compiler.

use log::debug;

pub mod backend;
pub mod error;
pub mod frontend;

pub use error::CompileError;

use crate::backend::CodeGenerator;
use crate::frontend::{SourceFile, ast::Program, lexer::Lexer, parser::Parser};

/// Front-to-back compilation of one source file into LLVM IR text.
pub fn compile_to_ir(source: &SourceFile) -> error::Result<String> {
    let program = parse(source)?;
    let ir = CodeGenerator::generate(&program)?;
    debug!("generated {} bytes of IR for {}", ir.len(), source.origin);

    Ok(ir)
}

/// The frontend half on its own: lex and parse without generating code.
pub fn parse(source: &SourceFile) -> error::Result<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    debug!("tokenized {} into {} tokens", source.origin, tokens.len());

    let program = Parser::parse_program(source, tokens)?;
    debug!(
        "parsed {} function definitions and {} type definitions",
        program.function_definitions.len(),
        program.type_definitions.len()
    );

    Ok(program)
}
