//! Whole-pipeline error surface. Each stage owns its error enum; this
//! wrapper is what library callers see from [`crate::compile_to_ir`].

use thiserror::Error;

use crate::backend::CodegenError;
use crate::frontend::{lexer::LexError, parser::ParseError};

/// The first error any stage produced. A failed stage stops the pipeline:
/// the parser never sees tokens from a failed lex, and the code generator
/// never sees an AST from a failed parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

pub type Result<T> = std::result::Result<T, CompileError>;
