use std::mem;
use std::rc::Rc;

use log::debug;

use crate::ast::{Expr, Literal, Stmt};
use crate::error::Diagnostics;
use crate::tokenizer::{Token, TokenType};

/// Marker for a statement that failed to parse. The message has already
/// been recorded in the diagnostics by the time this unwinds; the only
/// job left is to synchronize and keep going.
struct ParseError;

type ParseResult<T> = Result<T, ParseError>;

/// Parses a token stream into a statement list, collecting syntax
/// diagnostics as it goes. A statement that fails to parse is dropped
/// and the parser re-synchronizes at the next statement boundary, so one
/// error does not hide unrelated later ones.
pub fn parse(tokens: &[Token]) -> (Vec<Stmt>, Diagnostics) {
    let mut parser = Parser::new(tokens);
    let program = parser.program();
    debug!(
        "parsed {} statements, {} diagnostics",
        program.len(),
        parser.diagnostics.len()
    );
    (program, parser.diagnostics)
}

struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    diagnostics: Diagnostics,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Parser {
            tokens,
            current: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    fn program(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        statements
    }

    // --- token cursor helpers ---

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    /// Compares by variant only, so `TokenType::Number(0.0)` matches any
    /// number literal.
    fn check(&self, token_type: &TokenType) -> bool {
        !self.is_at_end()
            && mem::discriminant(&self.peek().token_type) == mem::discriminant(token_type)
    }

    fn match_any(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, token_type: &TokenType, message: &str) -> ParseResult<Token> {
        if self.check(token_type) {
            return Ok(self.advance().clone());
        }
        Err(self.error_at_current(message))
    }

    fn consume_identifier(&mut self, message: &str) -> ParseResult<Token> {
        if matches!(self.peek().token_type, TokenType::Identifier(_)) {
            return Ok(self.advance().clone());
        }
        Err(self.error_at_current(message))
    }

    fn error_at_current(&mut self, message: &str) -> ParseError {
        let (line, column) = (self.peek().line, self.peek().column);
        self.diagnostics.syntax(message, line, column);
        ParseError
    }

    fn error_at(&mut self, token: &Token, message: &str) -> ParseError {
        self.diagnostics.syntax(message, token.line, token.column);
        ParseError
    }

    /// Panic-mode recovery: discard tokens until a statement terminator
    /// or a keyword that unambiguously starts a new statement.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::Class
                | TokenType::Func
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // --- declarations and statements ---

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.match_any(&[TokenType::Var]) {
            self.var_declaration()
        } else if self.match_any(&[TokenType::Func]) {
            self.func_declaration()
        } else if self.check(&TokenType::Class) {
            let token = self.peek().clone();
            Err(self.error_at(&token, "Class declarations are not supported"))
        } else {
            self.statement()
        };

        match result {
            Ok(statement) => Some(statement),
            Err(ParseError) => {
                self.synchronize();
                None
            }
        }
    }

    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume_identifier("Expect variable name")?;

        let initializer = if self.match_any(&[TokenType::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            &TokenType::Semicolon,
            "Expect ';' after variable declaration",
        )?;
        Ok(Stmt::Var { name, initializer })
    }

    fn func_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume_identifier("Expect function name")?;
        self.consume(&TokenType::LeftParen, "Expect '(' after function name")?;

        let mut params = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                if params.len() >= 255 {
                    let (line, column) = (self.peek().line, self.peek().column);
                    self.diagnostics
                        .syntax("Cannot have more than 255 parameters", line, column);
                }
                params.push(self.consume_identifier("Expect parameter name")?);
                if !self.match_any(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(&TokenType::RightParen, "Expect ')' after parameters")?;
        self.consume(&TokenType::Colon, "Expect ':' before function body")?;

        let body = if self.match_any(&[TokenType::LeftBrace]) {
            self.block()?
        } else {
            vec![self.statement()?]
        };

        Ok(Stmt::Func {
            name,
            params,
            body: Rc::new(body),
        })
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_any(&[TokenType::Print]) {
            return self.print_statement();
        }
        if self.match_any(&[TokenType::LeftBrace]) {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.match_any(&[TokenType::If]) {
            return self.if_statement();
        }
        if self.match_any(&[TokenType::While]) {
            return self.while_statement();
        }
        if self.match_any(&[TokenType::For]) {
            return self.for_statement();
        }
        if self.match_any(&[TokenType::Return]) {
            return self.return_statement();
        }
        self.expression_statement()
    }

    fn print_statement(&mut self) -> ParseResult<Stmt> {
        let value = self.expression()?;
        self.consume(&TokenType::Semicolon, "Expect ';' after value")?;
        Ok(Stmt::Print(value))
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }

        self.consume(&TokenType::RightBrace, "Expect '}' after block")?;
        Ok(statements)
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(&TokenType::LeftParen, "Expect '(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(&TokenType::RightParen, "Expect ')' after if condition")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_any(&[TokenType::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(&TokenType::LeftParen, "Expect '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(&TokenType::RightParen, "Expect ')' after while condition")?;

        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    /// `for` has no node of its own: it is desugared here into an
    /// initializer-prefixed block wrapping a `while` whose body runs the
    /// increment as a trailing expression statement.
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(&TokenType::LeftParen, "Expect '(' after 'for'")?;

        let initializer = if self.match_any(&[TokenType::Semicolon]) {
            None
        } else if self.match_any(&[TokenType::Var]) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(&TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(&TokenType::Semicolon, "Expect ';' after loop condition")?;

        let increment = if !self.check(&TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(&TokenType::RightParen, "Expect ')' after for clauses")?;

        let mut body = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(increment)]);
        }

        let condition = condition.unwrap_or(Expr::Literal(Literal::Boolean(true)));
        body = Stmt::While {
            condition,
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block(vec![initializer, body]);
        }

        Ok(body)
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if !self.check(&TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(&TokenType::Semicolon, "Expect ';' after return value")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        self.consume(&TokenType::Semicolon, "Expect ';' after expression")?;
        Ok(Stmt::Expression(expr))
    }

    // --- expressions, lowest to highest precedence ---

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.or()?;

        if self.match_any(&[TokenType::Equal]) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);

            return match expr {
                Expr::Variable { name } => Ok(Expr::Assign { name, value }),
                Expr::Index {
                    object,
                    bracket,
                    index,
                } => Ok(Expr::IndexSet {
                    object,
                    bracket,
                    index,
                    value,
                }),
                _ => Err(self.error_at(&equals, "Invalid assignment target")),
            };
        }

        Ok(expr)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.and()?;

        while self.match_any(&[TokenType::Or]) {
            let operator = self.previous().clone();
            let right = self.and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;

        while self.match_any(&[TokenType::And]) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;

        while self.match_any(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.term()?;

        while self.match_any(&[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ]) {
            let operator = self.previous().clone();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.factor()?;

        while self.match_any(&[TokenType::Minus, TokenType::Plus]) {
            let operator = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;

        while self.match_any(&[TokenType::Slash, TokenType::Star, TokenType::Percent]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.match_any(&[TokenType::Bang, TokenType::Minus]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }
        self.call()
    }

    /// Postfix loop for `(...)` calls, `.name(...)` method calls, and
    /// `[index]` access, allowing arbitrary chaining like `a[0](x).y()`.
    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_any(&[TokenType::LeftParen]) {
                let paren = self.previous().clone();
                let arguments = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    paren,
                    arguments,
                };
            } else if self.match_any(&[TokenType::Dot]) {
                let method = self.consume_identifier("Expect method name after '.'")?;
                self.consume(&TokenType::LeftParen, "Expect '(' after method name")?;
                let arguments = self.arguments()?;
                expr = Expr::MethodCall {
                    object: Box::new(expr),
                    method,
                    arguments,
                };
            } else if self.match_any(&[TokenType::LeftBracket]) {
                let bracket = self.previous().clone();
                let index = self.expression()?;
                self.consume(&TokenType::RightBracket, "Expect ']' after index")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    bracket,
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Argument list, the opening parenthesis already consumed.
    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut arguments = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                if arguments.len() >= 255 {
                    let (line, column) = (self.peek().line, self.peek().column);
                    self.diagnostics
                        .syntax("Cannot have more than 255 arguments", line, column);
                }
                arguments.push(self.expression()?);
                if !self.match_any(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(&TokenType::RightParen, "Expect ')' after arguments")?;
        Ok(arguments)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        match token.token_type {
            TokenType::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(false)))
            }
            TokenType::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(true)))
            }
            TokenType::Void => {
                self.advance();
                Ok(Expr::Literal(Literal::Void))
            }
            TokenType::Number(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(value)))
            }
            TokenType::String(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(value)))
            }
            TokenType::Identifier(_) => {
                self.advance();
                Ok(Expr::Variable {
                    name: self.previous().clone(),
                })
            }
            TokenType::LeftBracket => {
                self.advance();
                self.list_literal()
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(&TokenType::RightParen, "Expect ')' after expression")?;
                Ok(Expr::Grouping(Box::new(expr)))
            }
            _ => Err(self.error_at(&token, "Expect expression")),
        }
    }

    fn list_literal(&mut self) -> ParseResult<Expr> {
        let bracket = self.previous().clone();
        let mut elements = Vec::new();

        if !self.check(&TokenType::RightBracket) {
            loop {
                elements.push(self.expression()?);
                if !self.match_any(&[TokenType::Comma]) {
                    break;
                }
                // Trailing comma.
                if self.check(&TokenType::RightBracket) {
                    break;
                }
            }
        }

        self.consume(&TokenType::RightBracket, "Expect ']' after list elements")?;
        Ok(Expr::List { bracket, elements })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::scan;

    fn parse_str(input: &str) -> (Vec<Stmt>, Diagnostics) {
        let (tokens, lex_diagnostics) = scan(input);
        assert!(lex_diagnostics.is_empty(), "lexical errors: {lex_diagnostics}");
        parse(&tokens)
    }

    fn parse_ok(input: &str) -> Vec<Stmt> {
        let (program, diagnostics) = parse_str(input);
        assert!(diagnostics.is_empty(), "syntax errors: {diagnostics}");
        program
    }

    #[test]
    fn test_literals_and_expression_statement() {
        let program = parse_ok("42; \"hello\"; true; void;");
        assert_eq!(program.len(), 4);
        assert!(matches!(
            program[0],
            Stmt::Expression(Expr::Literal(Literal::Number(n))) if n == 42.0
        ));
        assert!(matches!(
            &program[1],
            Stmt::Expression(Expr::Literal(Literal::String(s))) if s == "hello"
        ));
        assert!(matches!(
            program[3],
            Stmt::Expression(Expr::Literal(Literal::Void))
        ));
    }

    #[test]
    fn test_precedence_multiplication_binds_tighter() {
        let program = parse_ok("1 + 2 * 3;");
        let Stmt::Expression(Expr::Binary { operator, right, .. }) = &program[0] else {
            panic!("expected binary expression");
        };
        assert_eq!(operator.token_type, TokenType::Plus);
        assert!(matches!(**right, Expr::Binary { .. }));
    }

    #[test]
    fn test_grouping_overrides_precedence() {
        let program = parse_ok("(1 + 2) * 3;");
        let Stmt::Expression(Expr::Binary { operator, left, .. }) = &program[0] else {
            panic!("expected binary expression");
        };
        assert_eq!(operator.token_type, TokenType::Star);
        assert!(matches!(**left, Expr::Grouping(_)));
    }

    #[test]
    fn test_logical_operators_are_their_own_nodes() {
        let program = parse_ok("a and b or c;");
        let Stmt::Expression(Expr::Logical { operator, left, .. }) = &program[0] else {
            panic!("expected logical expression");
        };
        // `or` is lower precedence, so it ends up at the root.
        assert_eq!(operator.token_type, TokenType::Or);
        assert!(matches!(**left, Expr::Logical { .. }));
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let program = parse_ok("a = b = 1;");
        let Stmt::Expression(Expr::Assign { value, .. }) = &program[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(**value, Expr::Assign { .. }));
    }

    #[test]
    fn test_assignment_targets() {
        // Variable target becomes Assign; index target becomes IndexSet.
        let program = parse_ok("x = 1; l[0] = 2;");
        assert!(matches!(&program[0], Stmt::Expression(Expr::Assign { .. })));
        assert!(matches!(
            &program[1],
            Stmt::Expression(Expr::IndexSet { .. })
        ));

        // Anything else is a syntax error.
        let (_, diagnostics) = parse_str("1 + 2 = 3;");
        assert!(!diagnostics.is_empty());
        let (_, diagnostics) = parse_str("f() = 3;");
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn test_var_declaration() {
        let program = parse_ok("var x = 1; var y;");
        assert!(matches!(
            &program[0],
            Stmt::Var { initializer: Some(_), .. }
        ));
        assert!(matches!(&program[1], Stmt::Var { initializer: None, .. }));
    }

    #[test]
    fn test_func_declaration_with_single_statement_body() {
        let program = parse_ok("func add(a, b): return a + b;");
        let Stmt::Func { name, params, body } = &program[0] else {
            panic!("expected function declaration");
        };
        assert_eq!(name.lexeme, "add");
        assert_eq!(params.len(), 2);
        assert_eq!(body.len(), 1);
        assert!(matches!(body[0], Stmt::Return { .. }));
    }

    #[test]
    fn test_func_declaration_with_block_body() {
        let program = parse_ok("func f(x): { var y = x; return y; }");
        let Stmt::Func { body, .. } = &program[0] else {
            panic!("expected function declaration");
        };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn test_call_index_method_chaining() {
        let program = parse_ok("a[0](x).y();");
        let Stmt::Expression(Expr::MethodCall { object, method, .. }) = &program[0] else {
            panic!("expected method call at the root");
        };
        assert_eq!(method.lexeme, "y");
        let Expr::Call { callee, .. } = &**object else {
            panic!("expected call under the method");
        };
        assert!(matches!(**callee, Expr::Index { .. }));
    }

    #[test]
    fn test_member_access_requires_call() {
        let (_, diagnostics) = parse_str("a.b;");
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn test_list_literals() {
        let program = parse_ok("[]; [1, 2, 3]; [1, \"two\", true,];");
        let Stmt::Expression(Expr::List { elements, .. }) = &program[0] else {
            panic!("expected list literal");
        };
        assert!(elements.is_empty());

        let Stmt::Expression(Expr::List { elements, .. }) = &program[2] else {
            panic!("expected list literal");
        };
        assert_eq!(elements.len(), 3);
    }

    #[test]
    fn test_for_desugars_to_while() {
        let program = parse_ok("for (var i = 0; i < 3; i = i + 1) print i;");
        let Stmt::Block(outer) = &program[0] else {
            panic!("expected initializer block");
        };
        assert!(matches!(outer[0], Stmt::Var { .. }));
        let Stmt::While { body, .. } = &outer[1] else {
            panic!("expected while under the initializer");
        };
        let Stmt::Block(inner) = &**body else {
            panic!("expected body block carrying the increment");
        };
        assert!(matches!(inner[0], Stmt::Print(_)));
        assert!(matches!(inner[1], Stmt::Expression(Expr::Assign { .. })));
    }

    #[test]
    fn test_for_without_condition_defaults_to_true() {
        let program = parse_ok("for (;;) print 1;");
        let Stmt::While { condition, .. } = &program[0] else {
            panic!("expected bare while");
        };
        assert!(matches!(condition, Expr::Literal(Literal::Boolean(true))));
    }

    #[test]
    fn test_synchronize_reports_independent_errors() {
        let (program, diagnostics) = parse_str("var = 1; print 2; var y 3;");
        // Both bad declarations reported, good statement kept.
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(program.len(), 1);
        assert!(matches!(program[0], Stmt::Print(_)));
    }

    #[test]
    fn test_class_is_reserved() {
        let (_, diagnostics) = parse_str("class Foo {}");
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn test_error_cases() {
        for source in [
            "var;",
            "var x = ;",
            "var x = 1",
            "1 + ;",
            "if 1 { print 1; }",
            "func f(): {",
            "func f x: return 1;",
            "[1, 2",
            "l[0 = 1;",
        ] {
            let (_, diagnostics) = parse_str(source);
            assert!(!diagnostics.is_empty(), "expected error for {source:?}");
        }
    }
}
