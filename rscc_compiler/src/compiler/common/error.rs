//! The errors and diagnostics emitted throughout the compiler

/// Every diagnostic the compiler can produce. Syntax errors are fatal and
/// travel as [Error] values; semantic errors are reported through
/// [Diagnostics] and only counted.
#[derive(Debug, PartialEq, Clone)]
pub enum ErrorKind {
    // fatal errors
    SyntaxAt(String),
    SyntaxAtEof,
    Io(String),

    // semantic errors
    Redefined(String),
    Redeclared(String),
    Conflicting(String),
    Undeclared(String),
    VoidObject(String),
    InvalidReturn,
    InvalidTest,
    InvalidLvalue,
    InvalidBinary(&'static str),
    InvalidUnary(&'static str),
    InvalidFunction,
    InvalidArguments,
}

impl ErrorKind {
    pub fn message(&self) -> String {
        match self {
            ErrorKind::SyntaxAt(text) => format!("syntax error at '{}'", text),
            ErrorKind::SyntaxAtEof => "syntax error at end of file".to_string(),
            ErrorKind::Io(error) => format!("error writing output: {}", error),

            ErrorKind::Redefined(name) => format!("redefinition of '{}'", name),
            ErrorKind::Redeclared(name) => format!("redeclaration of '{}'", name),
            ErrorKind::Conflicting(name) => format!("conflicting types for '{}'", name),
            ErrorKind::Undeclared(name) => format!("'{}' undeclared", name),
            ErrorKind::VoidObject(name) => format!("'{}' has type void", name),
            ErrorKind::InvalidReturn => "invalid return type".to_string(),
            ErrorKind::InvalidTest => "invalid type for test expression".to_string(),
            ErrorKind::InvalidLvalue => "lvalue required in expression".to_string(),
            ErrorKind::InvalidBinary(op) => format!("invalid operands to binary {}", op),
            ErrorKind::InvalidUnary(op) => format!("invalid operand to unary {}", op),
            ErrorKind::InvalidFunction => "called object is not a function".to_string(),
            ErrorKind::InvalidArguments => "invalid arguments to called function".to_string(),
        }
    }
}

/// A fatal error, returned up to the driver which prints it and exits
/// with a nonzero code.
#[derive(Debug, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind }
    }

    pub fn print(&self) {
        eprintln!("{}", self.kind.message());
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::new(ErrorKind::Io(error.to_string()))
    }
}

/// The sink for semantic errors. Each report writes one line to stderr;
/// a nonzero count at the end of parsing suppresses assembly output.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { errors: 0 }
    }

    pub fn report(&mut self, kind: ErrorKind) {
        eprintln!("{}", kind.message());
        self.errors += 1;
    }

    pub fn errors(&self) -> usize {
        self.errors
    }
}
