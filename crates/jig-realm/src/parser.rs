//! Recursive-descent parser for the restricted language.

use std::rc::Rc;

use crate::ast::{
    AssignOp, BinaryOp, ClassDef, DeclKind, Expr, FunctionDef, LogicalOp, MethodDef, PropName,
    Stmt, UnaryOp,
};
use crate::error::{RealmError, RealmResult};
use crate::lexer::{Token, TokenKind, tokenize};

/// Words that can never be used as binding names.
const RESERVED: &[&str] = &[
    "break", "class", "const", "continue", "delete", "else", "extends", "false", "for",
    "function", "if", "in", "instanceof", "let", "new", "null", "of", "return", "static",
    "super", "this", "throw", "true", "typeof", "undefined", "var", "void", "while",
];

/// Constructs the language deliberately leaves out.
const UNSUPPORTED: &[&str] = &[
    "async", "await", "yield", "with", "try", "catch", "finally", "import", "export", "debugger",
    "switch", "do",
];

/// Parse a whole program.
pub(crate) fn parse_program(src: &str) -> RealmResult<Vec<Stmt>> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
    };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(body)
}

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = self.pos.saturating_add(offset).min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx].kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len().saturating_sub(1))].clone();
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos = self.pos.saturating_add(1);
        }
        tok
    }

    fn start_offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len().saturating_sub(1))].start
    }

    fn prev_end(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].end
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), TokenKind::Punct(q) if *q == p)
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(name) if name == w)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, w: &str) -> bool {
        if self.is_word(w) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> RealmResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{p}'")))
        }
    }

    fn unexpected(&self, wanted: &str) -> RealmError {
        let found = match self.peek() {
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Str(s) => format!("string '{s}'"),
            TokenKind::Ident(i) => format!("'{i}'"),
            TokenKind::Punct(p) => format!("'{p}'"),
            TokenKind::Eof => "end of input".to_owned(),
        };
        RealmError::Syntax(format!("expected {wanted} but found {found}"))
    }

    fn binding_name(&mut self) -> RealmResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            },
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Any identifier, keywords included (property names).
    fn property_word(&mut self) -> RealmResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            },
            _ => Err(self.unexpected("property name")),
        }
    }

    fn end_statement(&mut self) {
        self.eat_punct(";");
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn statement(&mut self) -> RealmResult<Stmt> {
        if let TokenKind::Ident(word) = self.peek() {
            if UNSUPPORTED.contains(&word.as_str()) {
                return Err(RealmError::Determinism(format!(
                    "'{word}' is not supported in jig code"
                )));
            }
        }

        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.is_punct("{") {
            return self.block().map(Stmt::Block);
        }
        if let Some(kind) = self.decl_kind() {
            self.advance();
            let stmt = self.declaration(kind)?;
            self.end_statement();
            return Ok(stmt);
        }
        if self.eat_word("if") {
            self.expect_punct("(")?;
            let test = self.expression()?;
            self.expect_punct(")")?;
            let then = Box::new(self.statement()?);
            let otherwise = if self.eat_word("else") {
                Some(Box::new(self.statement()?))
            } else {
                None
            };
            return Ok(Stmt::If {
                test,
                then,
                otherwise,
            });
        }
        if self.eat_word("while") {
            self.expect_punct("(")?;
            let test = self.expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::While { test, body });
        }
        if self.eat_word("for") {
            return self.for_statement();
        }
        if self.eat_word("return") {
            let value = if self.is_punct(";") || self.is_punct("}") || self.at_eof() {
                None
            } else {
                Some(self.expression()?)
            };
            self.end_statement();
            return Ok(Stmt::Return(value));
        }
        if self.eat_word("throw") {
            let value = self.expression()?;
            self.end_statement();
            return Ok(Stmt::Throw(value));
        }
        if self.eat_word("break") {
            self.end_statement();
            return Ok(Stmt::Break);
        }
        if self.eat_word("continue") {
            self.end_statement();
            return Ok(Stmt::Continue);
        }
        if self.is_word("function") {
            let def = self.function()?;
            if def.name.is_some() {
                return Ok(Stmt::Function(def));
            }
            let expr = self.postfix_tail(Expr::Function(def))?;
            self.end_statement();
            return Ok(Stmt::Expr(expr));
        }
        if self.is_word("class") {
            let def = self.class()?;
            if def.name.is_some() {
                return Ok(Stmt::Class(def));
            }
            self.end_statement();
            return Ok(Stmt::Expr(Expr::Class(def)));
        }

        let expr = self.expression()?;
        self.end_statement();
        Ok(Stmt::Expr(expr))
    }

    fn decl_kind(&self) -> Option<DeclKind> {
        match self.peek() {
            TokenKind::Ident(w) if w == "let" => Some(DeclKind::Let),
            TokenKind::Ident(w) if w == "const" => Some(DeclKind::Const),
            TokenKind::Ident(w) if w == "var" => Some(DeclKind::Var),
            _ => None,
        }
    }

    fn declaration(&mut self, kind: DeclKind) -> RealmResult<Stmt> {
        let mut decls = Vec::new();
        loop {
            let name = self.binding_name()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Decl { kind, decls })
    }

    fn block(&mut self) -> RealmResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn for_statement(&mut self) -> RealmResult<Stmt> {
        self.expect_punct("(")?;

        if let Some(kind) = self.decl_kind() {
            if matches!(self.peek_at(2), TokenKind::Ident(w) if w == "of") {
                self.advance();
                let name = self.binding_name()?;
                self.advance();
                let iterable = self.expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                return Ok(Stmt::ForOf {
                    kind,
                    name,
                    iterable,
                    body,
                });
            }
        }

        let init = if self.is_punct(";") {
            None
        } else if let Some(kind) = self.decl_kind() {
            self.advance();
            Some(Box::new(self.declaration(kind)?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    // -----------------------------------------------------------------------
    // Functions and classes
    // -----------------------------------------------------------------------

    fn params(&mut self) -> RealmResult<Vec<String>> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.is_punct(")") {
            params.push(self.binding_name()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    fn function(&mut self) -> RealmResult<Rc<FunctionDef>> {
        let start = self.start_offset();
        self.advance();
        let name = if matches!(self.peek(), TokenKind::Ident(_)) {
            Some(self.binding_name()?)
        } else {
            None
        };
        let params = self.params()?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDef {
            name,
            params,
            body,
            source: self.src[start..self.prev_end()].to_owned(),
        }))
    }

    fn method(&mut self, start: usize, name: String) -> RealmResult<Rc<FunctionDef>> {
        let params = self.params()?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDef {
            name: Some(name),
            params,
            body,
            source: self.src[start..self.prev_end()].to_owned(),
        }))
    }

    fn class(&mut self) -> RealmResult<Rc<ClassDef>> {
        let start = self.start_offset();
        self.advance();
        let name = if matches!(self.peek(), TokenKind::Ident(w) if w != "extends") {
            Some(self.binding_name()?)
        } else {
            None
        };
        let extends = if self.eat_word("extends") {
            Some(self.call_or_member(false)?)
        } else {
            None
        };

        self.expect_punct("{")?;
        let mut constructor = None;
        let mut methods = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            if self.eat_punct(";") {
                continue;
            }
            let member_start = self.start_offset();
            let is_static =
                self.is_word("static") && matches!(self.peek_at(1), TokenKind::Ident(_));
            if is_static {
                self.advance();
            }
            let method_name = match self.peek().clone() {
                TokenKind::Str(s) => {
                    self.advance();
                    s
                },
                _ => self.property_word()?,
            };
            let function = self.method(member_start, method_name.clone())?;
            if method_name == "constructor" && !is_static {
                if constructor.is_some() {
                    return Err(RealmError::Syntax(
                        "a class may only have one constructor".to_owned(),
                    ));
                }
                constructor = Some(function);
            } else {
                methods.push(MethodDef {
                    name: method_name,
                    is_static,
                    function,
                });
            }
        }
        self.advance();

        Ok(Rc::new(ClassDef {
            name,
            extends,
            constructor,
            methods,
            source: self.src[start..self.prev_end()].to_owned(),
        }))
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    pub(crate) fn expression(&mut self) -> RealmResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> RealmResult<Expr> {
        let target = self.conditional()?;
        let op = match self.peek() {
            TokenKind::Punct("=") => AssignOp::Assign,
            TokenKind::Punct("+=") => AssignOp::Add,
            TokenKind::Punct("-=") => AssignOp::Sub,
            TokenKind::Punct("*=") => AssignOp::Mul,
            _ => return Ok(target),
        };
        if !matches!(target, Expr::Ident(_) | Expr::Member { .. }) {
            return Err(RealmError::Syntax("invalid assignment target".to_owned()));
        }
        self.advance();
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> RealmResult<Expr> {
        let test = self.logical_or()?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let then = self.assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn logical_or(&mut self) -> RealmResult<Expr> {
        let mut left = self.logical_and()?;
        loop {
            let op = if self.eat_punct("||") {
                LogicalOp::Or
            } else if self.eat_punct("??") {
                LogicalOp::Nullish
            } else {
                return Ok(left);
            };
            let right = self.logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn logical_and(&mut self) -> RealmResult<Expr> {
        let mut left = self.equality()?;
        while self.eat_punct("&&") {
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> RealmResult<Expr>,
        ops: &[(&str, BinaryOp)],
    ) -> RealmResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                let matched = match self.peek() {
                    TokenKind::Punct(p) => p == token,
                    TokenKind::Ident(w) => w == token,
                    _ => false,
                };
                if matched {
                    self.advance();
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> RealmResult<Expr> {
        self.binary_level(
            Self::relational,
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNotEq),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::NotEq),
            ],
        )
    }

    fn relational(&mut self) -> RealmResult<Expr> {
        self.binary_level(
            Self::additive,
            &[
                ("<=", BinaryOp::LtEq),
                (">=", BinaryOp::GtEq),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
                ("instanceof", BinaryOp::InstanceOf),
                ("in", BinaryOp::In),
            ],
        )
    }

    fn additive(&mut self) -> RealmResult<Expr> {
        self.binary_level(
            Self::multiplicative,
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
        )
    }

    fn multiplicative(&mut self) -> RealmResult<Expr> {
        self.binary_level(
            Self::unary,
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
        )
    }

    fn unary(&mut self) -> RealmResult<Expr> {
        let op = match self.peek() {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Ident(w) if w == "typeof" => Some(UnaryOp::TypeOf),
            TokenKind::Ident(w) if w == "delete" => Some(UnaryOp::Delete),
            TokenKind::Ident(w) if w == "void" => Some(UnaryOp::Void),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }

        if self.is_punct("++") || self.is_punct("--") {
            let increment = self.is_punct("++");
            self.advance();
            let target = self.unary()?;
            if !matches!(target, Expr::Ident(_) | Expr::Member { .. }) {
                return Err(RealmError::Syntax("invalid update target".to_owned()));
            }
            return Ok(Expr::Update {
                target: Box::new(target),
                increment,
                prefix: true,
            });
        }

        let expr = self.call_or_member(true)?;
        if (self.is_punct("++") || self.is_punct("--"))
            && matches!(expr, Expr::Ident(_) | Expr::Member { .. })
        {
            let increment = self.is_punct("++");
            self.advance();
            return Ok(Expr::Update {
                target: Box::new(expr),
                increment,
                prefix: false,
            });
        }
        Ok(expr)
    }

    fn call_or_member(&mut self, allow_calls: bool) -> RealmResult<Expr> {
        let base = if self.eat_word("new") {
            let callee = self.call_or_member(false)?;
            let args = if self.is_punct("(") {
                self.arguments()?
            } else {
                Vec::new()
            };
            Expr::New {
                callee: Box::new(callee),
                args,
            }
        } else {
            self.primary()?
        };
        if allow_calls {
            self.postfix_tail(base)
        } else {
            self.member_tail(base)
        }
    }

    fn member_tail(&mut self, mut expr: Expr) -> RealmResult<Expr> {
        loop {
            if self.eat_punct(".") {
                let name = self.property_word()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: PropName::Static(name),
                };
            } else if self.eat_punct("[") {
                let key = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: PropName::Computed(Box::new(key)),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn postfix_tail(&mut self, mut expr: Expr) -> RealmResult<Expr> {
        loop {
            expr = self.member_tail(expr)?;
            if self.is_punct("(") {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> RealmResult<Vec<Expr>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.is_punct(")") {
            args.push(self.assignment()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn primary(&mut self) -> RealmResult<Expr> {
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            },
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            },
            TokenKind::Punct("(") => {
                self.advance();
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            },
            TokenKind::Punct("[") => {
                self.advance();
                let mut items = Vec::new();
                while !self.is_punct("]") {
                    items.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(Expr::Array(items))
            },
            TokenKind::Punct("{") => self.object_literal(),
            TokenKind::Ident(word) => self.word(&word),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn word(&mut self, word: &str) -> RealmResult<Expr> {
        match word {
            "true" => {
                self.advance();
                Ok(Expr::Bool(true))
            },
            "false" => {
                self.advance();
                Ok(Expr::Bool(false))
            },
            "null" => {
                self.advance();
                Ok(Expr::Null)
            },
            "undefined" => {
                self.advance();
                Ok(Expr::Undefined)
            },
            "this" => {
                self.advance();
                Ok(Expr::This)
            },
            "function" => self.function().map(Expr::Function),
            "class" => self.class().map(Expr::Class),
            "super" => {
                self.advance();
                if self.is_punct("(") {
                    Ok(Expr::SuperCall(self.arguments()?))
                } else if self.eat_punct(".") {
                    Ok(Expr::SuperMember(self.property_word()?))
                } else {
                    Err(self.unexpected("'(' or '.' after super"))
                }
            },
            w if UNSUPPORTED.contains(&w) => Err(RealmError::Determinism(format!(
                "'{w}' is not supported in jig code"
            ))),
            _ => Ok(Expr::Ident(self.binding_name()?)),
        }
    }

    fn object_literal(&mut self) -> RealmResult<Expr> {
        self.expect_punct("{")?;
        let mut props = Vec::new();
        while !self.is_punct("}") {
            let start = self.start_offset();
            let key = match self.peek().clone() {
                TokenKind::Str(s) => {
                    self.advance();
                    s
                },
                TokenKind::Number(n) => {
                    self.advance();
                    crate::value::number_to_string(n)
                },
                _ => self.property_word()?,
            };
            if self.eat_punct(":") {
                props.push((key, self.assignment()?));
            } else if self.is_punct("(") {
                let function = self.method(start, key.clone())?;
                props.push((key, Expr::Function(function)));
            } else {
                if RESERVED.contains(&key.as_str()) {
                    return Err(self.unexpected("':'"));
                }
                props.push((key.clone(), Expr::Ident(key)));
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Expr::Object(props))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_class_with_members() {
        let program = parse_program(
            "class A extends B { constructor(x) { super(x); this.n = 1 } static make() { return new A(1) } inc() { this.n += 1 } }",
        )
        .unwrap();
        let [Stmt::Class(def)] = program.as_slice() else {
            panic!("expected a single class, got {program:?}");
        };
        assert_eq!(def.name.as_deref(), Some("A"));
        assert!(def.extends.is_some());
        assert!(def.constructor.is_some());
        assert_eq!(def.methods.len(), 2);
        assert!(def.methods[0].is_static);
        assert!(def.source.starts_with("class A"));
        assert!(def.source.ends_with('}'));
    }

    #[test]
    fn test_precedence() {
        let program = parse_program("1 + 2 * 3").unwrap();
        let [Stmt::Expr(Expr::Binary { op, right, .. })] = program.as_slice() else {
            panic!("unexpected shape");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_for_of_and_classic_for() {
        assert!(parse_program("for (const x of xs) { y.push(x) }").is_ok());
        assert!(parse_program("for (let i = 0; i < 3; i++) {}").is_ok());
    }

    #[test]
    fn test_rejects_unsupported_constructs() {
        assert!(matches!(
            parse_program("async function f() {}"),
            Err(RealmError::Determinism(_))
        ));
        assert!(matches!(
            parse_program("try { x } catch (e) {}"),
            Err(RealmError::Determinism(_))
        ));
    }

    #[test]
    fn test_anonymous_function_expression() {
        let program = parse_program("function (a, b) { return a + b }").unwrap();
        assert!(matches!(program.as_slice(), [Stmt::Expr(Expr::Function(_))]));
    }
}
