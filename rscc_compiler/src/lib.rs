//! A compiler for Simple C, a restricted dialect of C, targeting x86-64
//! (System V) assembly in AT&T syntax.

pub mod compiler;

use compiler::codegen::Generator;
use compiler::common::error::Error;
use compiler::parser::Parser;
use compiler::scanner::Scanner;

/// Compiles a translation unit to assembly text.
///
/// Semantic diagnostics are written to stderr as they are found; if any
/// were reported the returned assembly is empty. A syntax error is fatal
/// and returned as `Err`.
pub fn compile(source: &str, dump_ast: bool) -> Result<String, Error> {
    // scan the whole input up front
    let tokens = Scanner::new(source).scan_token()?;

    // parsing drives checking and code generation; assembly accumulates
    // in the buffer and is only kept when the unit is error-free
    let mut output = Vec::new();
    let mut parser = Parser::new(tokens, dump_ast);
    let mut generator = Generator::new(&mut output);
    parser.parse(&mut generator)?;

    if parser.errors() > 0 {
        return Ok(String::new());
    }

    Ok(String::from_utf8(output).expect("generated assembly is ascii"))
}
