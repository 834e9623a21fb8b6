//! Parser
//!
//! Recursive descent parser from tokens to [`Ast`]. Semicolons are optional
//! wherever the next token cannot continue the statement.

use std::fmt;
use std::rc::Rc;

use super::ast::{AssignOp, Ast, BinaryOp, LogicalOp, Node, NodeId, UnaryOp, UpdateOp};
use super::lexer::{Lexer, Token, TokenKind};
use crate::value::number_to_string;

/// Why parsing stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Syntax,
    /// Source nested deeper than the parser's limit
    TooDeep,
}

/// Parser error
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub pos: usize,
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.pos)
    }
}

/// Script parser
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    ast: Ast,
    depth: usize,
    max_depth: usize,
}

impl<'src> Parser<'src> {
    /// Parser refusing statements and expressions nested deeper than `max_depth`
    pub fn new(source: &'src str, max_depth: usize) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self { lexer, current, ast: Ast::new(), depth: 0, max_depth }
    }

    fn advance(&mut self) -> Token {
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError { message: message.into(), pos: self.current.pos, kind: ParseErrorKind::Syntax })
    }

    /// Run `parse` one nesting level down
    fn nested(&mut self, parse: fn(&mut Self) -> Result<NodeId, ParseError>) -> Result<NodeId, ParseError> {
        if self.depth >= self.max_depth {
            return Err(ParseError {
                message: format!("nesting deeper than {} levels", self.max_depth),
                pos: self.current.pos,
                kind: ParseErrorKind::TooDeep,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn unexpected<T>(&self) -> Result<T, ParseError> {
        match &self.current.kind {
            TokenKind::Invalid(message) => self.error(message.to_string()),
            TokenKind::Eof => self.error("unexpected end of input"),
            other => self.error(format!("unexpected token {:?}", other)),
        }
    }

    fn consume(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            self.error(format!("expected {:?}, got {:?}", kind, self.current.kind))
        }
    }

    fn consume_semicolon(&mut self) {
        if self.check(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn add(&mut self, node: Node) -> NodeId {
        self.ast.add(node)
    }

    /// Parse a complete program
    pub fn parse(mut self) -> Result<Ast, ParseError> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        let root = self.add(Node::Program { body });
        self.ast.set_root(root);
        Ok(self.ast)
    }

    fn parse_statement(&mut self) -> Result<NodeId, ParseError> {
        self.nested(Self::statement)
    }

    fn statement(&mut self) -> Result<NodeId, ParseError> {
        match &self.current.kind {
            TokenKind::Var => {
                let decl = self.parse_variable_declaration()?;
                self.consume_semicolon();
                Ok(decl)
            }
            TokenKind::Function => self.parse_function_declaration(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::LBrace => self.parse_block_statement(),
            TokenKind::Semicolon => {
                self.advance();
                Ok(self.add(Node::Empty))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_variable_declaration(&mut self) -> Result<NodeId, ParseError> {
        self.advance(); // var
        let mut declarations = Vec::new();
        loop {
            let name = self.parse_identifier()?;
            let init = if self.check(&TokenKind::Eq) {
                self.advance();
                Some(self.parse_assignment()?)
            } else {
                None
            };
            declarations.push((name, init));
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(self.add(Node::Var { declarations }))
    }

    fn parse_function_declaration(&mut self) -> Result<NodeId, ParseError> {
        self.advance(); // function
        let name = self.parse_identifier()?;
        let params = self.parse_parameters()?;
        let body = self.parse_block_statement()?;
        Ok(self.add(Node::FunctionDecl { name, params, body }))
    }

    fn parse_parameters(&mut self) -> Result<Rc<[Box<str>]>, ParseError> {
        self.consume(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            params.push(self.parse_identifier()?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                params.push(self.parse_identifier()?);
            }
        }
        self.consume(TokenKind::RParen)?;
        Ok(params.into())
    }

    fn parse_if_statement(&mut self) -> Result<NodeId, ParseError> {
        self.advance(); // if
        self.consume(TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.consume(TokenKind::RParen)?;
        let consequent = self.parse_statement()?;
        let alternate = if self.check(&TokenKind::Else) {
            self.advance();
            Some(self.parse_statement()?)
        } else {
            None
        };
        Ok(self.add(Node::If { test, consequent, alternate }))
    }

    fn parse_while_statement(&mut self) -> Result<NodeId, ParseError> {
        self.advance(); // while
        self.consume(TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.consume(TokenKind::RParen)?;
        let body = self.parse_statement()?;
        Ok(self.add(Node::While { test, body }))
    }

    fn parse_for_statement(&mut self) -> Result<NodeId, ParseError> {
        self.advance(); // for
        self.consume(TokenKind::LParen)?;
        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else if self.check(&TokenKind::Var) {
            Some(self.parse_variable_declaration()?)
        } else {
            let expr = self.parse_expression()?;
            Some(self.add(Node::Expression { expr }))
        };
        self.consume(TokenKind::Semicolon)?;
        let test = if self.check(&TokenKind::Semicolon) { None } else { Some(self.parse_expression()?) };
        self.consume(TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RParen) { None } else { Some(self.parse_expression()?) };
        self.consume(TokenKind::RParen)?;
        let body = self.parse_statement()?;
        Ok(self.add(Node::For { init, test, update, body }))
    }

    fn parse_return_statement(&mut self) -> Result<NodeId, ParseError> {
        self.advance(); // return
        let argument = if matches!(self.current.kind, TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon();
        Ok(self.add(Node::Return { argument }))
    }

    fn parse_try_statement(&mut self) -> Result<NodeId, ParseError> {
        self.advance(); // try
        let block = self.parse_block_statement()?;
        self.consume(TokenKind::Catch)?;
        let param = if self.check(&TokenKind::LParen) {
            self.advance();
            let name = self.parse_identifier()?;
            self.consume(TokenKind::RParen)?;
            Some(name)
        } else {
            None
        };
        let handler = self.parse_block_statement()?;
        Ok(self.add(Node::Try { block, param, handler }))
    }

    fn parse_block_statement(&mut self) -> Result<NodeId, ParseError> {
        self.consume(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return self.unexpected();
            }
            body.push(self.parse_statement()?);
        }
        self.advance(); // }
        Ok(self.add(Node::Block { body }))
    }

    fn parse_expression_statement(&mut self) -> Result<NodeId, ParseError> {
        let expr = self.parse_expression()?;
        self.consume_semicolon();
        Ok(self.add(Node::Expression { expr }))
    }

    fn parse_expression(&mut self) -> Result<NodeId, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<NodeId, ParseError> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> Result<NodeId, ParseError> {
        let target = self.parse_conditional()?;
        let op = match self.current.kind {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::AddAssign,
            TokenKind::MinusEq => AssignOp::SubAssign,
            _ => return Ok(target),
        };
        if !self.is_assignable(target) {
            return self.error("invalid assignment target");
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(self.add(Node::Assign { op, target, value }))
    }

    fn is_assignable(&self, id: NodeId) -> bool {
        matches!(self.ast.get(id), Some(Node::Identifier(_) | Node::Member { .. } | Node::Index { .. }))
    }

    fn parse_conditional(&mut self) -> Result<NodeId, ParseError> {
        let test = self.parse_logical_or()?;
        if !self.check(&TokenKind::Question) {
            return Ok(test);
        }
        self.advance();
        let consequent = self.parse_assignment()?;
        self.consume(TokenKind::Colon)?;
        let alternate = self.parse_assignment()?;
        Ok(self.add(Node::Conditional { test, consequent, alternate }))
    }

    fn parse_logical_or(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.parse_logical_and()?;
        while self.check(&TokenKind::PipePipe) {
            self.advance();
            let right = self.parse_logical_and()?;
            left = self.add(Node::Logical { op: LogicalOp::Or, left, right });
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.parse_equality()?;
        while self.check(&TokenKind::AmpAmp) {
            self.advance();
            let right = self.parse_equality()?;
            left = self.add(Node::Logical { op: LogicalOp::And, left, right });
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current.kind {
                TokenKind::EqEq => BinaryOp::Equal,
                TokenKind::NotEq => BinaryOp::NotEqual,
                TokenKind::EqEqEq => BinaryOp::StrictEqual,
                TokenKind::NotEqEq => BinaryOp::StrictNotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = self.add(Node::Binary { op, left, right });
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current.kind {
                TokenKind::LessThan => BinaryOp::LessThan,
                TokenKind::LessThanEq => BinaryOp::LessThanEq,
                TokenKind::GreaterThan => BinaryOp::GreaterThan,
                TokenKind::GreaterThanEq => BinaryOp::GreaterThanEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = self.add(Node::Binary { op, left, right });
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.add(Node::Binary { op, left, right });
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<NodeId, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.add(Node::Binary { op, left, right });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<NodeId, ParseError> {
        self.nested(Self::unary)
    }

    fn unary(&mut self) -> Result<NodeId, ParseError> {
        let op = match self.current.kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Typeof => UnaryOp::Typeof,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if self.check(&TokenKind::PlusPlus) { UpdateOp::Increment } else { UpdateOp::Decrement };
                self.advance();
                let target = self.parse_unary()?;
                if !self.is_assignable(target) {
                    return self.error("invalid update target");
                }
                return Ok(self.add(Node::Update { op, prefix: true, target }));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let argument = self.parse_unary()?;
        Ok(self.add(Node::Unary { op, argument }))
    }

    fn parse_postfix(&mut self) -> Result<NodeId, ParseError> {
        let expr = self.parse_call()?;
        let op = match self.current.kind {
            TokenKind::PlusPlus => UpdateOp::Increment,
            TokenKind::MinusMinus => UpdateOp::Decrement,
            _ => return Ok(expr),
        };
        if !self.is_assignable(expr) {
            return self.error("invalid update target");
        }
        self.advance();
        Ok(self.add(Node::Update { op, prefix: false, target: expr }))
    }

    fn parse_call(&mut self) -> Result<NodeId, ParseError> {
        let expr = if self.check(&TokenKind::New) { self.parse_new()? } else { self.parse_primary()? };
        self.parse_call_tail(expr, true)
    }

    fn parse_new(&mut self) -> Result<NodeId, ParseError> {
        self.nested(Self::new_expression)
    }

    fn new_expression(&mut self) -> Result<NodeId, ParseError> {
        self.advance(); // new
        let callee = if self.check(&TokenKind::New) { self.parse_new()? } else { self.parse_primary()? };
        let callee = self.parse_call_tail(callee, false)?;
        let arguments = if self.check(&TokenKind::LParen) {
            self.advance();
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(self.add(Node::New { callee, arguments }))
    }

    /// Member accesses and, when `calls`, call suffixes
    fn parse_call_tail(&mut self, mut expr: NodeId, calls: bool) -> Result<NodeId, ParseError> {
        loop {
            match self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_property_name()?;
                    expr = self.add(Node::Member { object: expr, property });
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.consume(TokenKind::RBracket)?;
                    expr = self.add(Node::Index { object: expr, index });
                }
                TokenKind::LParen if calls => {
                    self.advance();
                    let arguments = self.parse_arguments()?;
                    expr = self.add(Node::Call { callee: expr, arguments });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Arguments after `(`, consuming the closing `)`
    fn parse_arguments(&mut self) -> Result<Vec<NodeId>, ParseError> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            args.push(self.parse_assignment()?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                args.push(self.parse_assignment()?);
            }
        }
        self.consume(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<NodeId, ParseError> {
        let node = match &self.current.kind {
            TokenKind::Number(n) => Node::Number(*n),
            TokenKind::String(s) => Node::String(s.clone()),
            TokenKind::True => Node::Bool(true),
            TokenKind::False => Node::Bool(false),
            TokenKind::Null => Node::Null,
            TokenKind::Undefined => Node::Undefined,
            TokenKind::This => Node::This,
            TokenKind::Identifier(name) => Node::Identifier(name.clone()),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(TokenKind::RParen)?;
                return Ok(expr);
            }
            TokenKind::Function => return self.parse_function_expression(),
            TokenKind::LBrace => return self.parse_object_literal(),
            _ => return self.unexpected(),
        };
        self.advance();
        Ok(self.add(node))
    }

    fn parse_function_expression(&mut self) -> Result<NodeId, ParseError> {
        self.advance(); // function
        let name = if matches!(self.current.kind, TokenKind::Identifier(_)) { Some(self.parse_identifier()?) } else { None };
        let params = self.parse_parameters()?;
        let body = self.parse_block_statement()?;
        Ok(self.add(Node::Function { name, params, body }))
    }

    fn parse_object_literal(&mut self) -> Result<NodeId, ParseError> {
        self.advance(); // {
        let mut properties = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key = match &self.current.kind {
                TokenKind::String(s) => {
                    let key = s.clone();
                    self.advance();
                    key
                }
                TokenKind::Number(n) => {
                    let key = number_to_string(*n).into();
                    self.advance();
                    key
                }
                _ => self.parse_property_name()?,
            };
            self.consume(TokenKind::Colon)?;
            let value = self.parse_assignment()?;
            properties.push((key, value));
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.consume(TokenKind::RBrace)?;
        Ok(self.add(Node::Object { properties }))
    }

    fn parse_identifier(&mut self) -> Result<Box<str>, ParseError> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => self.error(format!("expected identifier, got {:?}", self.current.kind)),
        }
    }

    /// Identifier or keyword after `.` or as an object key
    fn parse_property_name(&mut self) -> Result<Box<str>, ParseError> {
        let name = match &self.current.kind {
            TokenKind::Identifier(name) => name.clone(),
            other => match keyword_text(other) {
                Some(text) => text.into(),
                None => return self.error(format!("expected property name, got {:?}", other)),
            },
        };
        self.advance();
        Ok(name)
    }
}

fn keyword_text(kind: &TokenKind) -> Option<&'static str> {
    Some(match kind {
        TokenKind::Var => "var",
        TokenKind::Function => "function",
        TokenKind::Return => "return",
        TokenKind::If => "if",
        TokenKind::Else => "else",
        TokenKind::While => "while",
        TokenKind::For => "for",
        TokenKind::Try => "try",
        TokenKind::Catch => "catch",
        TokenKind::New => "new",
        TokenKind::This => "this",
        TokenKind::Typeof => "typeof",
        TokenKind::True => "true",
        TokenKind::False => "false",
        TokenKind::Null => "null",
        TokenKind::Undefined => "undefined",
        _ => return None,
    })
}

/// Parse source text into an AST
pub fn parse(source: &str, max_depth: usize) -> Result<Ast, ParseError> {
    Parser::new(source, max_depth).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_body(ast: &Ast) -> Vec<NodeId> {
        match ast.root().and_then(|r| ast.get(r)) {
            Some(Node::Program { body }) => body.clone(),
            other => panic!("not a program: {:?}", other),
        }
    }

    #[test]
    fn test_function_declaration() {
        let ast = parse("function f(a, b) { return a + b; }", 64).unwrap();
        let body = root_body(&ast);
        assert!(matches!(ast.get(body[0]), Some(Node::FunctionDecl { params, .. }) if params.len() == 2));
    }

    #[test]
    fn test_optional_semicolons() {
        let ast = parse("var a = 1\nvar b = 2\na + b", 64).unwrap();
        assert_eq!(root_body(&ast).len(), 3);
    }

    #[test]
    fn test_member_call_chain() {
        let ast = parse("document.forms['f'].elements.item(0).value", 64).unwrap();
        let body = root_body(&ast);
        let Some(Node::Expression { expr }) = ast.get(body[0]) else { panic!("expected expression") };
        assert!(matches!(ast.get(*expr), Some(Node::Member { property, .. }) if &**property == "value"));
    }

    #[test]
    fn test_new_with_arguments() {
        let ast = parse("var x = new XMLHttpRequest();", 64).unwrap();
        let body = root_body(&ast);
        let Some(Node::Var { declarations }) = ast.get(body[0]) else { panic!("expected var") };
        let init = declarations[0].1.unwrap();
        assert!(matches!(ast.get(init), Some(Node::New { arguments, .. }) if arguments.is_empty()));
    }

    #[test]
    fn test_keyword_property_names() {
        assert!(parse("p.catch = 1; var o = {new: 2, 'a b': 3}", 64).is_ok());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = |n: usize| format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert!(parse(&deep(20), 64).is_ok());
        let err = parse(&deep(100_000), 64).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeep);

        assert_eq!(parse(&"!".repeat(10_000), 64).unwrap_err().kind, ParseErrorKind::TooDeep);
        assert_eq!(parse(&"{".repeat(10_000), 64).unwrap_err().kind, ParseErrorKind::TooDeep);
        assert_eq!(parse(&"new ".repeat(10_000), 64).unwrap_err().kind, ParseErrorKind::TooDeep);
        assert_eq!(parse(&"a = ".repeat(10_000), 64).unwrap_err().kind, ParseErrorKind::TooDeep);
    }

    #[test]
    fn test_nesting_depth_is_released() {
        // Many shallow siblings never add up
        let flat = "(1);".repeat(10_000);
        assert!(parse(&flat, 8).is_ok());
    }

    #[test]
    fn test_errors() {
        assert!(parse("var = 1", 64).is_err());
        assert!(parse("1 = 2", 64).is_err());
        assert!(parse("{ a", 64).is_err());
        assert!(parse("'open", 64).is_err());
    }
}
