//! Recursive-descent parser for Simple C
//!
//! The parser owns the checker and calls into it while consuming tokens,
//! so the tree it hands on is already typed. There is no error recovery:
//! the first syntax error is returned as a fatal [Error]. Each function
//! definition is allocated and generated as soon as its closing brace is
//! parsed, provided no semantic errors have been reported yet; the end of
//! the token stream triggers emission of globals and string literals.

use crate::compiler::checker::Checker;
use crate::compiler::codegen::Generator;
use crate::compiler::common::error::{Error, ErrorKind};
use crate::compiler::common::expr::{BinaryOp, Expr, ExprKind, ExprRef};
use crate::compiler::common::stmt::{Function, Stmt};
use crate::compiler::common::token::Token;
use crate::compiler::common::types::{Specifier, Type};
use std::io::Write;
use std::iter::Peekable;
use std::rc::Rc;

#[derive(Debug)]
pub struct Parser {
    tokens: Peekable<std::vec::IntoIter<Token>>,

    pub checker: Checker,

    // return type of the function definition being parsed
    return_type: Type,

    dump_ast: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, dump_ast: bool) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
            checker: Checker::new(),
            return_type: Type::Error,
            dump_ast,
        }
    }

    /// Parses the whole translation unit, generating code on the fly.
    pub fn parse<W: Write>(&mut self, gen: &mut Generator<W>) -> Result<(), Error> {
        self.checker.open_scope();

        while self.tokens.peek().is_some() {
            self.global_or_function(gen)?;
        }

        let globals = self.checker.close_scope();
        if self.errors() == 0 {
            gen.generate_globals(&globals)?;
        }

        Ok(())
    }

    pub fn errors(&self) -> usize {
        self.checker.diagnostics.errors()
    }

    fn syntax_error(&mut self) -> Error {
        match self.tokens.peek() {
            Some(token) => Error::new(ErrorKind::SyntaxAt(token.to_string())),
            None => Error::new(ErrorKind::SyntaxAtEof),
        }
    }

    fn matches(&mut self, expected: &Token) -> bool {
        match self.tokens.peek() {
            Some(token) if token == expected => {
                self.tokens.next();
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), Error> {
        if self.matches(&expected) {
            Ok(())
        } else {
            Err(self.syntax_error())
        }
    }

    fn identifier(&mut self) -> Result<String, Error> {
        match self.tokens.peek() {
            Some(Token::Ident(_)) => {
                let Some(Token::Ident(name)) = self.tokens.next() else {
                    unreachable!("just peeked an identifier");
                };
                Ok(name)
            }
            _ => Err(self.syntax_error()),
        }
    }

    fn number(&mut self) -> Result<u64, Error> {
        match self.tokens.peek() {
            Some(Token::Number(_)) => {
                let Some(Token::Number(value)) = self.tokens.next() else {
                    unreachable!("just peeked a number");
                };
                Ok(value)
            }
            _ => Err(self.syntax_error()),
        }
    }

    fn is_specifier(&mut self) -> bool {
        matches!(
            self.tokens.peek(),
            Some(Token::Int | Token::Char | Token::Long | Token::Void)
        )
    }

    // <specifier> ::= int | char | long | void
    fn specifier(&mut self) -> Result<Specifier, Error> {
        let specifier = match self.tokens.peek() {
            Some(Token::Int) => Specifier::Int,
            Some(Token::Char) => Specifier::Char,
            Some(Token::Long) => Specifier::Long,
            Some(Token::Void) => Specifier::Void,
            _ => return Err(self.syntax_error()),
        };
        self.tokens.next();
        Ok(specifier)
    }

    // <pointers> ::= {'*'}*
    fn pointers(&mut self) -> u32 {
        let mut count = 0;
        while self.matches(&Token::Star) {
            count += 1;
        }
        count
    }

    // <declarator> ::= <pointers> ID ['[' NUM ']']
    fn declarator(&mut self, specifier: Specifier) -> Result<(), Error> {
        let indirection = self.pointers();
        let name = self.identifier()?;

        if self.matches(&Token::LeftBracket) {
            let length = self.number()?;
            self.checker
                .declare_variable(&name, Type::array(specifier, indirection, length));
            self.expect(Token::RightBracket)
        } else {
            self.checker
                .declare_variable(&name, Type::scalar(specifier, indirection));
            Ok(())
        }
    }

    // <declaration> ::= <specifier> <declarator> {',' <declarator>}* ';'
    fn declaration(&mut self) -> Result<(), Error> {
        let specifier = self.specifier()?;
        self.declarator(specifier)?;

        while self.matches(&Token::Comma) {
            self.declarator(specifier)?;
        }

        self.expect(Token::Semicolon)
    }

    fn declarations(&mut self) -> Result<(), Error> {
        while self.is_specifier() {
            self.declaration()?;
        }
        Ok(())
    }

    // <primary-expression> ::= '(' <expression> ')'
    //                        | ID '(' [<expression-list>] ')'
    //                        | ID | NUM | CHARACTER | STRING
    fn primary_expression(&mut self) -> Result<ExprRef, Error> {
        match self.tokens.peek() {
            Some(Token::LeftParen) => {
                self.tokens.next();
                let expr = self.expression()?;
                self.expect(Token::RightParen)?;

                // parenthesization denotes a value, not a location
                if expr.lvalue {
                    Ok(Expr::new(expr.kind.clone(), expr.ty.clone(), false))
                } else {
                    Ok(expr)
                }
            }
            Some(Token::CharLit(_)) => {
                let Some(Token::CharLit(value)) = self.tokens.next() else {
                    unreachable!("just peeked a character literal");
                };
                Ok(Expr::number(value as u64))
            }
            Some(Token::String(_)) => {
                let Some(Token::String(value)) = self.tokens.next() else {
                    unreachable!("just peeked a string literal");
                };
                let length = value.len() as u64 + 1;
                Ok(Expr::new(
                    ExprKind::String(value),
                    Type::array(Specifier::Char, 0, length),
                    false,
                ))
            }
            Some(Token::Number(_)) => {
                let value = self.number()?;
                Ok(Expr::number(value))
            }
            Some(Token::Ident(_)) => {
                let name = self.identifier()?;
                let symbol = self.checker.check_identifier(&name);

                if self.matches(&Token::LeftParen) {
                    let mut args = Vec::new();

                    if self.tokens.peek() != Some(&Token::RightParen) {
                        args.push(self.expression()?);
                        while self.matches(&Token::Comma) {
                            args.push(self.expression()?);
                        }
                    }

                    let expr = self.checker.check_call(symbol, args);
                    self.expect(Token::RightParen)?;
                    Ok(expr)
                } else {
                    let lvalue = symbol.ty.is_scalar();
                    Ok(Expr::new(
                        ExprKind::Ident(Rc::clone(&symbol)),
                        symbol.ty.clone(),
                        lvalue,
                    ))
                }
            }
            _ => Err(self.syntax_error()),
        }
    }

    // <postfix-expression> ::= <primary-expression> {'[' <expression> ']'}*
    fn postfix_expression(&mut self) -> Result<ExprRef, Error> {
        let mut left = self.primary_expression()?;

        while self.matches(&Token::LeftBracket) {
            let right = self.expression()?;
            self.expect(Token::RightBracket)?;
            left = self.checker.check_array(left, right);
        }

        Ok(left)
    }

    // <prefix-expression> ::= <postfix-expression>
    //                       | ('!' | '-' | '*' | '&' | sizeof) <prefix-expression>
    fn prefix_expression(&mut self) -> Result<ExprRef, Error> {
        if self.matches(&Token::Bang) {
            let expr = self.prefix_expression()?;
            Ok(self.checker.check_not(expr))
        } else if self.matches(&Token::Minus) {
            let expr = self.prefix_expression()?;
            Ok(self.checker.check_negate(expr))
        } else if self.matches(&Token::Star) {
            let expr = self.prefix_expression()?;
            Ok(self.checker.check_dereference(expr))
        } else if self.matches(&Token::Amp) {
            let expr = self.prefix_expression()?;
            Ok(self.checker.check_address(expr))
        } else if self.matches(&Token::Sizeof) {
            let expr = self.prefix_expression()?;
            Ok(self.checker.check_sizeof(expr))
        } else {
            self.postfix_expression()
        }
    }

    fn multiplicative_expression(&mut self) -> Result<ExprRef, Error> {
        let mut left = self.prefix_expression()?;

        loop {
            let op = if self.matches(&Token::Star) {
                BinaryOp::Multiply
            } else if self.matches(&Token::Slash) {
                BinaryOp::Divide
            } else if self.matches(&Token::Mod) {
                BinaryOp::Remainder
            } else {
                break;
            };

            let right = self.prefix_expression()?;
            left = self.checker.check_multiplicative(op, left, right);
        }

        Ok(left)
    }

    fn additive_expression(&mut self) -> Result<ExprRef, Error> {
        let mut left = self.multiplicative_expression()?;

        loop {
            if self.matches(&Token::Plus) {
                let right = self.multiplicative_expression()?;
                left = self.checker.check_add(left, right);
            } else if self.matches(&Token::Minus) {
                let right = self.multiplicative_expression()?;
                left = self.checker.check_subtract(left, right);
            } else {
                break;
            }
        }

        Ok(left)
    }

    fn relational_expression(&mut self) -> Result<ExprRef, Error> {
        let mut left = self.additive_expression()?;

        loop {
            let op = if self.matches(&Token::Less) {
                BinaryOp::Less
            } else if self.matches(&Token::Greater) {
                BinaryOp::Greater
            } else if self.matches(&Token::LessEqual) {
                BinaryOp::LessEqual
            } else if self.matches(&Token::GreaterEqual) {
                BinaryOp::GreaterEqual
            } else {
                break;
            };

            let right = self.additive_expression()?;
            left = self.checker.check_relational(op, left, right);
        }

        Ok(left)
    }

    fn equality_expression(&mut self) -> Result<ExprRef, Error> {
        let mut left = self.relational_expression()?;

        loop {
            let op = if self.matches(&Token::EqualEqual) {
                BinaryOp::Equal
            } else if self.matches(&Token::BangEqual) {
                BinaryOp::NotEqual
            } else {
                break;
            };

            let right = self.relational_expression()?;
            left = self.checker.check_equality(op, left, right);
        }

        Ok(left)
    }

    fn logical_and_expression(&mut self) -> Result<ExprRef, Error> {
        let mut left = self.equality_expression()?;

        while self.matches(&Token::AmpAmp) {
            let right = self.equality_expression()?;
            left = self.checker.check_logical(BinaryOp::And, left, right);
        }

        Ok(left)
    }

    // <expression> ::= <logical-and-expression> {'||' <logical-and-expression>}*
    fn expression(&mut self) -> Result<ExprRef, Error> {
        let mut left = self.logical_and_expression()?;

        while self.matches(&Token::PipePipe) {
            let right = self.logical_and_expression()?;
            left = self.checker.check_logical(BinaryOp::Or, left, right);
        }

        Ok(left)
    }

    // <assignment> ::= <expression> ['=' <expression>]
    fn assignment(&mut self) -> Result<Stmt, Error> {
        let expr = self.expression()?;

        if self.matches(&Token::Equal) {
            let right = self.expression()?;
            Ok(self.checker.check_assignment(expr, right))
        } else {
            Ok(Stmt::Simple(expr))
        }
    }

    fn statements(&mut self) -> Result<Vec<Stmt>, Error> {
        let mut stmts = Vec::new();

        // a statement sequence is always closed by a brace
        while self.tokens.peek() != Some(&Token::RightBrace) {
            stmts.push(self.statement()?);
        }

        Ok(stmts)
    }

    // <statement> ::= '{' <declarations> <statements> '}'
    //               | return <expression> ';'
    //               | while '(' <expression> ')' <statement>
    //               | for '(' <assignment> ';' <expression> ';' <assignment> ')' <statement>
    //               | if '(' <expression> ')' <statement> [else <statement>]
    //               | <assignment> ';'
    fn statement(&mut self) -> Result<Stmt, Error> {
        if self.matches(&Token::LeftBrace) {
            self.checker.open_scope();
            self.declarations()?;
            let stmts = self.statements()?;
            let scope = self.checker.close_scope();
            self.expect(Token::RightBrace)?;
            Ok(Stmt::Block { scope, stmts })
        } else if self.matches(&Token::Return) {
            let expr = self.expression()?;
            let return_type = self.return_type.clone();
            let expr = self.checker.check_return(expr, &return_type);
            self.expect(Token::Semicolon)?;
            Ok(Stmt::Return(expr))
        } else if self.matches(&Token::While) {
            self.expect(Token::LeftParen)?;
            let cond = self.expression()?;
            let cond = self.checker.check_test(cond);
            self.expect(Token::RightParen)?;
            let body = self.statement()?;
            Ok(Stmt::While { cond, body: Box::new(body) })
        } else if self.matches(&Token::For) {
            self.expect(Token::LeftParen)?;
            let init = self.assignment()?;
            self.expect(Token::Semicolon)?;
            let cond = self.expression()?;
            let cond = self.checker.check_test(cond);
            self.expect(Token::Semicolon)?;
            let incr = self.assignment()?;
            self.expect(Token::RightParen)?;
            let body = self.statement()?;
            Ok(Stmt::For {
                init: Box::new(init),
                cond,
                incr: Box::new(incr),
                body: Box::new(body),
            })
        } else if self.matches(&Token::If) {
            self.expect(Token::LeftParen)?;
            let cond = self.expression()?;
            let cond = self.checker.check_test(cond);
            self.expect(Token::RightParen)?;
            let then_branch = Box::new(self.statement()?);
            let else_branch = if self.matches(&Token::Else) {
                Some(Box::new(self.statement()?))
            } else {
                None
            };
            Ok(Stmt::If { cond, then_branch, else_branch })
        } else {
            let stmt = self.assignment()?;
            self.expect(Token::Semicolon)?;
            Ok(stmt)
        }
    }

    // <parameter> ::= <specifier> <pointers> ID
    fn parameter(&mut self) -> Result<Type, Error> {
        let specifier = self.specifier()?;
        let indirection = self.pointers();
        let name = self.identifier()?;

        let ty = Type::scalar(specifier, indirection);
        self.checker.declare_variable(&name, ty.clone());
        Ok(ty)
    }

    // <parameters> ::= void | [void] <pointers> ID {',' <parameter>}*
    fn parameters(&mut self) -> Result<Vec<Type>, Error> {
        let mut params = Vec::new();

        let specifier = if self.matches(&Token::Void) {
            if self.tokens.peek() == Some(&Token::RightParen) {
                return Ok(params);
            }
            Specifier::Void
        } else {
            self.specifier()?
        };

        let indirection = self.pointers();
        let name = self.identifier()?;

        let ty = Type::scalar(specifier, indirection);
        self.checker.declare_variable(&name, ty.clone());
        params.push(ty);

        while self.matches(&Token::Comma) {
            params.push(self.parameter()?);
        }

        Ok(params)
    }

    // <global-declarator> ::= <pointers> ID ['(' ')' | '[' NUM ']']
    fn global_declarator(&mut self, specifier: Specifier) -> Result<(), Error> {
        let indirection = self.pointers();
        let name = self.identifier()?;

        if self.matches(&Token::LeftParen) {
            self.checker
                .declare_function(&name, Type::function(specifier, indirection, None));
            self.expect(Token::RightParen)
        } else if self.matches(&Token::LeftBracket) {
            let length = self.number()?;
            self.checker
                .declare_variable(&name, Type::array(specifier, indirection, length));
            self.expect(Token::RightBracket)
        } else {
            self.checker
                .declare_variable(&name, Type::scalar(specifier, indirection));
            Ok(())
        }
    }

    fn remaining_declarators(&mut self, specifier: Specifier) -> Result<(), Error> {
        while self.matches(&Token::Comma) {
            self.global_declarator(specifier)?;
        }
        self.expect(Token::Semicolon)
    }

    // Parses the remainder of a definition once the opening parenthesis
    // has been consumed and is known not to be followed by ')'.
    fn function_definition(
        &mut self,
        specifier: Specifier,
        indirection: u32,
        name: String,
    ) -> Result<Function, Error> {
        // the parameters live in the same scope as the body
        self.checker.open_scope();
        self.return_type = Type::scalar(specifier, indirection);

        let params = self.parameters()?;
        let id = self
            .checker
            .define_function(&name, Type::function(specifier, indirection, Some(params)));
        self.expect(Token::RightParen)?;
        self.expect(Token::LeftBrace)?;
        self.declarations()?;
        let stmts = self.statements()?;
        let scope = self.checker.close_scope();
        self.expect(Token::RightBrace)?;

        Ok(Function { id, body: Stmt::Block { scope, stmts } })
    }

    // <global-or-function> ::= <specifier> <pointers> ID '[' NUM ']' <remaining-declarators>
    //                        | <specifier> <pointers> ID '(' ')' <remaining-declarators>
    //                        | <specifier> <pointers> ID '(' <parameters> ')' '{' ... '}'
    //                        | <specifier> <pointers> ID <remaining-declarators>
    fn global_or_function<W: Write>(&mut self, gen: &mut Generator<W>) -> Result<(), Error> {
        let specifier = self.specifier()?;
        let indirection = self.pointers();
        let name = self.identifier()?;

        if self.matches(&Token::LeftBracket) {
            let length = self.number()?;
            self.checker
                .declare_variable(&name, Type::array(specifier, indirection, length));
            self.expect(Token::RightBracket)?;
            self.remaining_declarators(specifier)
        } else if self.matches(&Token::LeftParen) {
            if self.matches(&Token::RightParen) {
                self.checker
                    .declare_function(&name, Type::function(specifier, indirection, None));
                self.remaining_declarators(specifier)
            } else {
                let function = self.function_definition(specifier, indirection, name)?;

                if self.dump_ast {
                    eprintln!("{}", function);
                }
                if self.errors() == 0 {
                    gen.generate_function(&function)?;
                }

                Ok(())
            }
        } else {
            self.checker
                .declare_variable(&name, Type::scalar(specifier, indirection));
            self.remaining_declarators(specifier)
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    // Runs a whole program through parsing, checking and generation,
    // returning the semantic error count.
    pub fn parse(input: &str) -> Result<(Parser, Vec<u8>), Error> {
        let tokens = crate::compiler::scanner::Scanner::new(input).scan_token()?;
        let mut output = Vec::new();
        let mut parser = Parser::new(tokens, false);
        let mut gen = Generator::new(&mut output);
        parser.parse(&mut gen)?;
        drop(gen);
        Ok((parser, output))
    }

    pub fn errors_for(input: &str) -> usize {
        let (parser, _) = parse(input).expect("no syntax errors expected");
        parser.errors()
    }

    // Parses a single function definition and hands back its tree.
    pub fn parse_function(input: &str) -> Function {
        let tokens = crate::compiler::scanner::Scanner::new(input).scan_token().unwrap();
        let mut parser = Parser::new(tokens, false);
        parser.checker.open_scope();

        let specifier = parser.specifier().unwrap();
        let indirection = parser.pointers();
        let name = parser.identifier().unwrap();
        assert!(parser.matches(&Token::LeftParen));

        let function = parser.function_definition(specifier, indirection, name).unwrap();
        assert_eq!(parser.errors(), 0);
        function
    }

    #[test]
    fn empty_function_parses() {
        assert_eq!(errors_for("int main(void) { return 0; }"), 0);
    }

    #[test]
    fn syntax_error_names_the_token() {
        let error = parse("int 5;").unwrap_err();
        assert_eq!(error.kind.message(), "syntax error at '5'");

        let error = parse("int x = 3;").unwrap_err();
        assert_eq!(error.kind.message(), "syntax error at '='");
    }

    #[test]
    fn syntax_error_at_end_of_file() {
        let error = parse("int x").unwrap_err();
        assert_eq!(error.kind.message(), "syntax error at end of file");

        let error = parse("int main(void) {").unwrap_err();
        assert_eq!(error.kind.message(), "syntax error at end of file");
    }

    #[test]
    fn for_requires_all_three_clauses() {
        let error =
            parse("int main(void) { int i; for (; i < 10; i = i + 1) i = 0; return 0; }")
                .unwrap_err();
        assert_eq!(error.kind.message(), "syntax error at ';'");
    }

    #[test]
    fn globals_functions_and_arrays() {
        assert_eq!(
            errors_for("int x, *p, a[10]; char *s; long f(); int main(void) { return 0; }"),
            0
        );
    }

    #[test]
    fn precedence_shapes_the_tree() {
        let tokens = crate::compiler::scanner::Scanner::new("1 + 2 * 3 < 4 && 5")
            .scan_token()
            .unwrap();
        let mut parser = Parser::new(tokens, false);
        parser.checker.open_scope();
        let expr = parser.expression().unwrap();
        assert_eq!(expr.to_string(), "(&& (< (+ 1 (* 2 3)) 4) 5)");
    }

    fn primary(input: &str) -> ExprRef {
        let tokens = crate::compiler::scanner::Scanner::new(input).scan_token().unwrap();
        let mut parser = Parser::new(tokens, false);
        parser.checker.open_scope();
        parser
            .checker
            .declare_variable("x", Type::scalar(Specifier::Int, 0));
        parser.primary_expression().unwrap()
    }

    #[test]
    fn parenthesization_clears_lvalue() {
        assert!(primary("x").lvalue);
        assert!(!primary("(x)").lvalue);
    }
}
