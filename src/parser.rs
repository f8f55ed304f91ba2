//! Converts sequences of tokens to an AST.
//!
//! The parser is implemented as a recursive descent parser with one token of
//! lookahead (`cur`, `next`). Type checking happens on the fly: every
//! expression descent carries a "current expected type", every consumed leaf
//! is checked against it, and definitions are recorded into a stack of scope
//! maps that is pushed and popped in lockstep with the lexical structure.
//!
//! This module provides:
//! - [`parse`]: A function to parse [a lexer's token stream][`crate::lexer`] into an AST.
//! - [`Parser`]: The struct that does all the parsing.

use std::io::BufRead;

use crate::ast::{
    ArithExpr, ArithOp, ArrayExpr, AssignStmt, CallExpr, CallKind, CallStmt, CmpOp, Condition,
    Expr, ForStmt, FuncDecl, FuncSig, FuncTable, IfStmt, IndexExpr, Literal, Param, Program,
    RetStmt, ScopeMap, Stmt, Ty, WhileStmt,
};
use crate::err::{impl_from_err, FullMinicErr, MinicErr};
use crate::lexer::token::{token, FullToken, Keyword, Token};
use crate::lexer::Lexer;

/// An error that occurs in the parsing process.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseErr {
    /// The lexer produced a lexeme that fits no token class.
    IllegalToken(String),

    /// The parser expected one of the tokens.
    ExpectedTokens(Vec<Token>),

    /// The parser expected an identifier.
    ExpectedIdent,

    /// The parser expected an expression here, but failed to match one.
    ExpectedExpr,

    /// The string provided could not be parsed into a numeric value.
    CannotParseNumeric,

    /// A function header's return type is not one of `void`, `int`, `float`.
    UnsupportedRetType,

    /// A function parameter's type is not `int` or `float`.
    UnsupportedParamType,

    /// A variable was declared with type `void`.
    VoidVar,

    /// The name already exists in the live scope chain or the function table.
    Redeclared(String),

    /// The name is in no live scope and is not a known function.
    Undefined(String),

    /// An expression's type disagrees with the enclosing context.
    TypeMismatch { expected: Ty, found: Ty },

    /// A scalar variable was indexed.
    NotIndexable(String),

    /// A whole array was used as an assignment target.
    ArrayAssign(String),

    /// An array length was not an integer literal of at least 2.
    BadArrayLen,

    /// An array literal's element count disagrees with the declared length.
    BadArrayArity { len: u32, count: usize },

    /// A call's argument count disagrees with the callee's parameter list.
    WrongArgCount {
        name: String,
        expected: usize,
        found: usize,
    },

    /// Reading the source failed.
    IoErr(String),
}

impl MinicErr for ParseErr {
    fn err_name(&self) -> &'static str {
        match self {
            ParseErr::IllegalToken(_) => "lex error",

            | ParseErr::ExpectedTokens(_)
            | ParseErr::ExpectedIdent
            | ParseErr::ExpectedExpr
            | ParseErr::CannotParseNumeric
            | ParseErr::UnsupportedRetType
            | ParseErr::UnsupportedParamType
            => "syntax error",

            | ParseErr::Redeclared(_)
            | ParseErr::Undefined(_)
            => "name error",

            | ParseErr::VoidVar
            | ParseErr::TypeMismatch { .. }
            | ParseErr::NotIndexable(_)
            | ParseErr::ArrayAssign(_)
            | ParseErr::BadArrayLen
            | ParseErr::BadArrayArity { .. }
            | ParseErr::WrongArgCount { .. }
            => "type error",

            ParseErr::IoErr(_) => "io error",
        }
    }
}

impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErr::IllegalToken(lexeme) => write!(f, "illegal token '{lexeme}'"),
            ParseErr::ExpectedTokens(tokens) => match tokens.len() {
                0 => write!(f, "expected eof"),
                1 => write!(f, "expected '{}'", tokens[0]),
                _ => {
                    let (first, rest) = tokens.split_first().unwrap();
                    write!(f, "expected one of '{first}'")?;
                    for t in rest {
                        write!(f, ", '{t}'")?;
                    }
                    Ok(())
                }
            },
            ParseErr::ExpectedIdent => write!(f, "expected identifier"),
            ParseErr::ExpectedExpr => write!(f, "expected expression"),
            ParseErr::CannotParseNumeric => write!(f, "could not parse numeric"),
            ParseErr::UnsupportedRetType => write!(f, "unsupported return type"),
            ParseErr::UnsupportedParamType => write!(f, "unsupported parameter type"),
            ParseErr::VoidVar => write!(f, "cannot declare a variable of type void"),
            ParseErr::Redeclared(name) => write!(f, "re-definition of '{name}'"),
            ParseErr::Undefined(name) => write!(f, "undefined name '{name}'"),
            ParseErr::TypeMismatch { expected, found } => {
                write!(f, "expected type {expected}, found {found}")
            }
            ParseErr::NotIndexable(name) => write!(f, "'{name}' is not an array"),
            ParseErr::ArrayAssign(name) => {
                write!(f, "array '{name}' can only be assigned element-wise")
            }
            ParseErr::BadArrayLen => {
                write!(f, "array length must be an integer literal of at least 2")
            }
            ParseErr::BadArrayArity { len, count } => {
                write!(f, "array of length {len} initialized with {count} elements")
            }
            ParseErr::WrongArgCount {
                name,
                expected,
                found,
            } => write!(f, "'{name}' takes {expected} argument(s), found {found}"),
            ParseErr::IoErr(msg) => write!(f, "{msg}"),
        }
    }
}
impl std::error::Error for ParseErr {}

impl_from_err! { std::io::Error => ParseErr: err => ParseErr::IoErr(err.to_string()) }

/// A [`Result`] type for operations in the parsing process.
pub type ParseResult<T> = Result<T, FullParseErr>;
type FullParseErr = FullMinicErr<ParseErr>;

/// Parse a lexer's token stream into a program and its function table.
///
/// The function table is pre-seeded with the two print built-ins and gains an
/// entry per function definition, in source order.
///
/// # Example
/// ```
/// use std::io::Cursor;
/// use minic::lexer::Lexer;
/// use minic::parser::parse;
///
/// let lexer = Lexer::new(Cursor::new("int main() { return 0; }"));
/// let (program, funcs) = parse(lexer).unwrap();
/// assert_eq!(program.funcs.len(), 1);
/// assert!(funcs.contains_key("main"));
/// ```
pub fn parse<R: BufRead>(lexer: Lexer<R>) -> ParseResult<(Program, FuncTable)> {
    let mut parser = Parser::new(lexer)?;
    let program = parser.parse_program()?;
    Ok((program, parser.funcs))
}

/// The struct that parses a token stream into a [`Program`].
pub struct Parser<R> {
    lexer: Lexer<R>,
    cur: FullToken,
    next: FullToken,

    /// The live scope chain, innermost last.
    scopes: Vec<ScopeMap>,
    /// The process-wide function definition table.
    funcs: FuncTable,
    /// The type the currently parsed expression must have; `None` means the
    /// first typed leaf resolves it.
    expected: Option<Ty>,
}

/// The semantic type named by a type keyword.
fn type_keyword(tok: &Token) -> Option<Ty> {
    match tok {
        Token::Keyword(Keyword::Void) => Some(Ty::Void),
        Token::Keyword(Keyword::Int) => Some(Ty::Int),
        Token::Keyword(Keyword::Float) => Some(Ty::Float),
        _ => None,
    }
}

impl<R: BufRead> Parser<R> {
    /// Create a parser over the given lexer, pre-loading the two lookahead
    /// tokens and seeding the function table with the print built-ins.
    pub fn new(lexer: Lexer<R>) -> ParseResult<Self> {
        let mut funcs = FuncTable::default();
        funcs.insert(
            "printVarInt".to_string(),
            FuncSig { ret: Ty::Void, params: vec![Ty::Int], builtin: true },
        );
        funcs.insert(
            "printVarFloat".to_string(),
            FuncSig { ret: Ty::Void, params: vec![Ty::Float], builtin: true },
        );

        let mut parser = Parser {
            lexer,
            cur: FullToken::new(Token::Eof, 0),
            next: FullToken::new(Token::Eof, 0),
            scopes: vec![],
            funcs,
            expected: None,
        };
        parser.advance()?;
        parser.advance()?;
        Ok(parser)
    }

    /// Shift the lookahead window forward by one token.
    ///
    /// An [`Token::Illegal`] lexeme terminates parsing here, quoting the line
    /// it was formed on.
    fn advance(&mut self) -> ParseResult<()> {
        let tok = self.lexer.next_token()?;
        if let Token::Illegal(lexeme) = &tok.kind {
            return Err(ParseErr::IllegalToken(lexeme.clone()).at(tok.line));
        }
        self.cur = std::mem::replace(&mut self.next, tok);
        Ok(())
    }

    /// Expect `cur` to be the given token and consume it.
    fn expect(&mut self, tok: Token) -> ParseResult<()> {
        if self.cur.kind == tok {
            self.advance()
        } else {
            Err(ParseErr::ExpectedTokens(vec![tok]).at(self.cur.line))
        }
    }

    /// Expect `cur` to be an identifier and consume it.
    fn expect_ident(&mut self) -> ParseResult<String> {
        match &self.cur.kind {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            _ => Err(ParseErr::ExpectedIdent.at(self.cur.line)),
        }
    }

    /// Run `f` inside a fresh scope; the scope is popped on every exit path
    /// and handed back for attachment to the AST node that owns it.
    fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<(T, ScopeMap)> {
        self.scopes.push(ScopeMap::new());
        let result = f(self);
        let map = self.scopes.pop().expect("scope stack balanced");
        result.map(|t| (t, map))
    }

    /// Run `f` with the expected expression type swapped, restoring the
    /// previous expectation afterwards.
    fn with_expected<T>(
        &mut self,
        expected: Option<Ty>,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let saved = std::mem::replace(&mut self.expected, expected);
        let result = f(self);
        self.expected = saved;
        result
    }

    /// Look a variable up through the live scope chain, innermost first.
    fn lookup_var(&self, name: &str) -> Option<Ty> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    /// Record a variable in the innermost scope, rejecting any name that is
    /// already a live variable or a known function.
    fn declare(&mut self, name: &str, ty: Ty, line: usize) -> ParseResult<()> {
        if self.lookup_var(name).is_some() || self.funcs.contains_key(name) {
            return Err(ParseErr::Redeclared(name.to_string()).at(line));
        }
        self.scopes
            .last_mut()
            .expect("inside a function scope")
            .insert(name.to_string(), ty);
        Ok(())
    }

    /// Check a typed leaf (identifier, index, or call) against the expected
    /// type, or let it resolve an open expectation.
    fn check_leaf(&mut self, found: Ty, line: usize) -> ParseResult<()> {
        match self.expected {
            Some(expected) if expected == found => Ok(()),
            Some(expected) => Err(ParseErr::TypeMismatch { expected, found }.at(line)),
            None => {
                self.expected = Some(found);
                Ok(())
            }
        }
    }

    /// Check a numeric literal against the expected type. Integer literals
    /// are valid in both `int` and `float` contexts (the emitter coerces
    /// them); float literals require a `float` context.
    fn check_literal(&mut self, lit: Literal, line: usize) -> ParseResult<()> {
        match (lit, self.expected) {
            (Literal::Int(_), None | Some(Ty::Int) | Some(Ty::Float)) => Ok(()),
            (Literal::Float(_), Some(Ty::Float)) => Ok(()),
            (Literal::Float(_), None) => {
                self.expected = Some(Ty::Float);
                Ok(())
            }
            (_, expected) => Err(ParseErr::TypeMismatch {
                expected: expected.unwrap_or(Ty::Int),
                found: lit.ty(),
            }
            .at(line)),
        }
    }

    /// `parseProgram`: function definitions until EOF.
    fn parse_program(&mut self) -> ParseResult<Program> {
        let mut funcs = vec![];
        while self.cur.kind != Token::Eof {
            funcs.push(self.parse_func()?);
        }
        Ok(Program { funcs })
    }

    /// `FunctionDef := Type Ident '(' ArgList? ')' '{' Statement* '}'`
    ///
    /// The signature is recorded into the function table before the body is
    /// parsed so that recursive calls resolve.
    fn parse_func(&mut self) -> ParseResult<FuncDecl> {
        let ret = match &self.cur.kind {
            token![void] => Ty::Void,
            token![int] => Ty::Int,
            token![float] => Ty::Float,
            _ => return Err(ParseErr::UnsupportedRetType.at(self.cur.line)),
        };
        self.advance()?;

        let name_line = self.cur.line;
        let name = self.expect_ident()?;
        self.expect(token!["("])?;

        let ((params, body), locals) = self.scoped(|p| {
            let params = p.parse_params()?;

            if p.funcs.contains_key(&name) {
                return Err(ParseErr::Redeclared(name.clone()).at(name_line));
            }
            p.funcs.insert(
                name.clone(),
                FuncSig {
                    ret,
                    params: params.iter().map(|a| a.ty).collect(),
                    builtin: false,
                },
            );

            p.expect(token!["{"])?;
            let body = p.parse_block_stmts(&name)?;
            Ok((params, body))
        })?;

        Ok(FuncDecl { ret, name, params, body, locals })
    }

    /// `ArgList := (Type Ident)(',' Type Ident)*`. Arguments are recorded
    /// into the function's local scope. Consumes through the closing `)`.
    fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        let mut params = vec![];

        if self.cur.kind == token![")"] {
            self.advance()?;
            return Ok(params);
        }

        loop {
            let ty = match &self.cur.kind {
                token![int] => Ty::Int,
                token![float] => Ty::Float,
                _ => return Err(ParseErr::UnsupportedParamType.at(self.cur.line)),
            };
            self.advance()?;

            let line = self.cur.line;
            let name = self.expect_ident()?;
            self.declare(&name, ty, line)?;
            params.push(Param { ty, name });

            match &self.cur.kind {
                token![,] => self.advance()?,
                token![")"] => {
                    self.advance()?;
                    return Ok(params);
                }
                _ => {
                    return Err(
                        ParseErr::ExpectedTokens(vec![token![,], token![")"]]).at(self.cur.line)
                    )
                }
            }
        }
    }

    /// Statements until the closing `}` of the enclosing block, which is
    /// consumed.
    fn parse_block_stmts(&mut self, fn_name: &str) -> ParseResult<Vec<Stmt>> {
        let mut stmts = vec![];
        while self.cur.kind != token!["}"] {
            if self.cur.kind == Token::Eof {
                return Err(ParseErr::ExpectedTokens(vec![token!["}"]]).at(self.cur.line));
            }
            stmts.push(self.parse_statement(fn_name)?);
        }
        self.advance()?;
        Ok(stmts)
    }

    /// Statement dispatch: the first token decides.
    fn parse_statement(&mut self, fn_name: &str) -> ParseResult<Stmt> {
        match &self.cur.kind {
            token![if] => self.parse_if(fn_name).map(Stmt::If),
            token![for] => self.parse_for(fn_name).map(Stmt::For),
            token![while] => self.parse_while(fn_name).map(Stmt::While),
            token![return] => {
                let ret = self.parse_return(fn_name)?;
                self.expect(token![;])?;
                Ok(Stmt::Return(ret))
            }
            Token::Ident(name) if self.funcs.contains_key(name.as_str()) => {
                let kind = match self.funcs[name.as_str()].builtin {
                    true => CallKind::Builtin,
                    false => CallKind::User,
                };
                let call = self.parse_call()?;
                self.expect(token![;])?;
                Ok(Stmt::Call(CallStmt { kind, call }))
            }
            token![int] | token![float] | token![void] | Token::Ident(_) => {
                let assn = self.parse_assign()?;
                self.expect(token![;])?;
                Ok(Stmt::Assign(assn))
            }
            _ => Err(ParseErr::ExpectedExpr.at(self.cur.line)),
        }
    }

    /// An assignment, without its terminator (`for` headers reuse this).
    ///
    /// Two forms: a declaration (leading type keyword, with zero-, scalar- or
    /// array-initializer) or a reassignment of a name already in scope.
    fn parse_assign(&mut self) -> ParseResult<AssignStmt> {
        if let Some(decl_ty) = type_keyword(&self.cur.kind) {
            let scalar = match decl_ty {
                Ty::Void => return Err(ParseErr::VoidVar.at(self.cur.line)),
                t => t,
            };
            self.advance()?;

            let line = self.cur.line;
            let Token::Ident(name) = self.cur.kind.clone() else {
                return Err(ParseErr::ExpectedIdent.at(line));
            };
            let is_array = self.next.kind == token!["["];
            let var_ty = match is_array {
                true => scalar.array_of().expect("int or float element"),
                false => scalar,
            };
            self.declare(&name, var_ty, line)?;
            self.advance()?;

            let value = if is_array {
                Expr::Array(self.parse_array_expr(scalar)?)
            } else if self.cur.kind == token![;] {
                // bare declaration: synthesize the zero initializer
                Expr::Literal(Literal::zero(scalar))
            } else {
                self.expect(token![=])?;
                self.with_expected(Some(scalar), |p| p.parse_expression())?
            };

            Ok(AssignStmt { target: Expr::Ident(name), value })
        } else {
            let line = self.cur.line;
            let Token::Ident(name) = self.cur.kind.clone() else {
                return Err(ParseErr::ExpectedIdent.at(line));
            };
            let Some(ty) = self.lookup_var(&name) else {
                return Err(ParseErr::Undefined(name).at(line));
            };

            let target = if self.next.kind == token!["["] {
                if !ty.is_array() {
                    return Err(ParseErr::NotIndexable(name).at(line));
                }
                Expr::Index(self.parse_index()?)
            } else {
                if ty.is_array() {
                    return Err(ParseErr::ArrayAssign(name).at(line));
                }
                self.advance()?;
                Expr::Ident(name)
            };

            self.expect(token![=])?;
            let value = self.with_expected(Some(ty.element()), |p| p.parse_expression())?;
            Ok(AssignStmt { target, value })
        }
    }

    /// `'[' length ']' '=' '{' (expr (',' expr)*)? '}'`. The length must be
    /// an integer literal ≥ 2, and the brace list is either empty or exactly
    /// `length` long.
    fn parse_array_expr(&mut self, elem: Ty) -> ParseResult<ArrayExpr> {
        self.expect(token!["["])?;

        let line = self.cur.line;
        let len = match &self.cur.kind {
            Token::Int(s) => s.parse::<i64>().ok().filter(|&n| n >= 2),
            _ => None,
        };
        let Some(len) = len else {
            return Err(ParseErr::BadArrayLen.at(line));
        };
        self.advance()?;

        self.expect(token!["]"])?;
        self.expect(token![=])?;
        self.expect(token!["{"])?;

        let mut elems = vec![];
        if self.cur.kind != token!["}"] {
            loop {
                elems.push(self.with_expected(Some(elem), |p| p.parse_expression())?);
                match &self.cur.kind {
                    token![,] => self.advance()?,
                    _ => break,
                }
            }
        }

        let end_line = self.cur.line;
        self.expect(token!["}"])?;

        if !elems.is_empty() && elems.len() != len as usize {
            return Err(ParseErr::BadArrayArity {
                len: len as u32,
                count: elems.len(),
            }
            .at(end_line));
        }

        Ok(ArrayExpr { len: len as u32, elems })
    }

    /// `ident '[' expr ']'`; the index expression is forced to integer type.
    fn parse_index(&mut self) -> ParseResult<IndexExpr> {
        let line = self.cur.line;
        let Token::Ident(name) = self.cur.kind.clone() else {
            return Err(ParseErr::ExpectedIdent.at(line));
        };
        self.advance()?;

        self.expect(token!["["])?;
        let index = self.with_expected(Some(Ty::Int), |p| p.parse_expression())?;
        self.expect(token!["]"])?;

        Ok(IndexExpr { name, index: Box::new(index) })
    }

    /// `ident '(' args? ')'`; arguments are typed against the callee's
    /// declared parameter list.
    fn parse_call(&mut self) -> ParseResult<CallExpr> {
        let line = self.cur.line;
        let Token::Ident(name) = self.cur.kind.clone() else {
            return Err(ParseErr::ExpectedIdent.at(line));
        };
        let sig = self
            .funcs
            .get(&name)
            .cloned()
            .ok_or_else(|| ParseErr::Undefined(name.clone()).at(line))?;
        self.advance()?;

        self.expect(token!["("])?;
        let mut args = vec![];
        if self.cur.kind != token![")"] {
            loop {
                let pty = sig.params.get(args.len()).copied();
                args.push(self.with_expected(pty, |p| p.parse_expression())?);
                match &self.cur.kind {
                    token![,] => self.advance()?,
                    _ => break,
                }
            }
        }
        self.expect(token![")"])?;

        if args.len() != sig.params.len() {
            return Err(ParseErr::WrongArgCount {
                name,
                expected: sig.params.len(),
                found: args.len(),
            }
            .at(line));
        }

        Ok(CallExpr { name, args })
    }

    /// `return` or `return expr`, typed against the enclosing function's
    /// declared return type. The terminating `;` is left to the caller.
    fn parse_return(&mut self, fn_name: &str) -> ParseResult<RetStmt> {
        let line = self.cur.line;
        self.advance()?;

        let ret = self.funcs[fn_name].ret;
        let value = if self.cur.kind == token![;] {
            if ret != Ty::Void {
                return Err(ParseErr::TypeMismatch { expected: ret, found: Ty::Void }.at(line));
            }
            None
        } else {
            Some(self.with_expected(Some(ret), |p| p.parse_expression())?)
        };

        Ok(RetStmt { value })
    }

    /// `expr CMP expr` where `CMP ∈ {<, >, <=, >=, ==, !=}`. The two-char
    /// comparators are recognized by noticing `=` in the lookahead.
    ///
    /// Both operands share one inference context: the first typed leaf fixes
    /// the operand type; a condition made only of integer literals compares
    /// at `int`.
    fn parse_condition(&mut self) -> ParseResult<Condition> {
        let saved = self.expected.take();
        let result = self.parse_condition_inner();
        let resolved = std::mem::replace(&mut self.expected, saved);

        let (op, left, right) = result?;
        Ok(Condition {
            op,
            ty: resolved.unwrap_or(Ty::Int),
            left,
            right,
        })
    }

    fn parse_condition_inner(&mut self) -> ParseResult<(CmpOp, Expr, Expr)> {
        let left = self.parse_expression()?;

        let line = self.cur.line;
        let (op, two_chars) = match &self.cur.kind {
            token![<] if self.next.kind == token![=] => (CmpOp::Le, true),
            token![>] if self.next.kind == token![=] => (CmpOp::Ge, true),
            token![=] if self.next.kind == token![=] => (CmpOp::Eq, true),
            token![!] if self.next.kind == token![=] => (CmpOp::Ne, true),
            token![<] => (CmpOp::Lt, false),
            token![>] => (CmpOp::Gt, false),
            _ => {
                return Err(ParseErr::ExpectedTokens(vec![
                    token![<],
                    token![>],
                    token![=],
                    token![!],
                ])
                .at(line))
            }
        };
        self.advance()?;
        if two_chars {
            self.advance()?;
        }

        let right = self.parse_expression()?;
        Ok((op, left, right))
    }

    /// `if '(' Condition ')' Block ('else' Block)?`; each arm owns a scope.
    fn parse_if(&mut self, fn_name: &str) -> ParseResult<IfStmt> {
        self.advance()?;
        self.expect(token!["("])?;
        let cond = self.parse_condition()?;
        self.expect(token![")"])?;

        self.expect(token!["{"])?;
        let (taken, taken_scope) = self.scoped(|p| p.parse_block_stmts(fn_name))?;

        let (not_taken, not_taken_scope) = if self.cur.kind == token![else] {
            self.advance()?;
            self.expect(token!["{"])?;
            self.scoped(|p| p.parse_block_stmts(fn_name))?
        } else {
            (vec![], ScopeMap::new())
        };

        Ok(IfStmt {
            cond,
            taken,
            taken_scope,
            not_taken,
            not_taken_scope,
        })
    }

    /// `for '(' Assign ';' Condition ';' Assign ')' Block`; the induction
    /// variable declared by the init assignment lives in the loop's scope.
    fn parse_for(&mut self, fn_name: &str) -> ParseResult<ForStmt> {
        self.advance()?;
        self.expect(token!["("])?;

        let ((init, cond, step, body), scope) = self.scoped(|p| {
            let init = p.parse_assign()?;
            p.expect(token![;])?;
            let cond = p.parse_condition()?;
            p.expect(token![;])?;
            let step = p.parse_assign()?;
            p.expect(token![")"])?;

            p.expect(token!["{"])?;
            let body = p.parse_block_stmts(fn_name)?;
            Ok((init, cond, step, body))
        })?;

        Ok(ForStmt {
            init: Box::new(init),
            cond,
            step: Box::new(step),
            body,
            scope,
        })
    }

    /// `while '(' Condition ')' Block`
    fn parse_while(&mut self, fn_name: &str) -> ParseResult<WhileStmt> {
        self.advance()?;
        self.expect(token!["("])?;

        let ((cond, body), scope) = self.scoped(|p| {
            let cond = p.parse_condition()?;
            p.expect(token![")"])?;
            p.expect(token!["{"])?;
            let body = p.parse_block_stmts(fn_name)?;
            Ok((cond, body))
        })?;

        Ok(WhileStmt { cond, body, scope })
    }

    /// `expression := term (('+'|'-') term)*`
    fn parse_expression(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match &self.cur.kind {
                token![+] => ArithOp::Add,
                token![-] => ArithOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_term()?;
            left = Expr::Arith(ArithExpr {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    /// `term := factor (('*'|'/') factor)*`
    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match &self.cur.kind {
                token![*] => ArithOp::Mul,
                token![/] => ArithOp::Div,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_factor()?;
            left = Expr::Arith(ArithExpr {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    /// `factor := '(' expression ')' | ('+'|'-') factor | literal
    ///          | identifier | callExpr | indexExpr`
    fn parse_factor(&mut self) -> ParseResult<Expr> {
        match &self.cur.kind {
            token!["("] => {
                self.advance()?;
                let inner = self.parse_expression()?;
                self.expect(token![")"])?;
                Ok(inner)
            }
            token![+] | token![-] => {
                // unary: desugared to (0 ± operand), the zero typed by the
                // current expected type
                let op = match self.cur.kind == token![-] {
                    true => ArithOp::Sub,
                    false => ArithOp::Add,
                };
                self.advance()?;
                let operand = self.parse_factor()?;
                let zero = Literal::zero(self.expected.unwrap_or(Ty::Int));
                Ok(Expr::Arith(ArithExpr {
                    op,
                    left: Box::new(Expr::Literal(zero)),
                    right: Box::new(operand),
                }))
            }
            Token::Int(_) | Token::Float(_) => {
                let line = self.cur.line;
                let lexeme = match &self.cur.kind {
                    Token::Int(s) | Token::Float(s) => s.clone(),
                    _ => unreachable!(),
                };
                let lit = Literal::from_numeric(&lexeme)
                    .ok_or_else(|| ParseErr::CannotParseNumeric.at(line))?;
                self.check_literal(lit, line)?;
                self.advance()?;
                Ok(Expr::Literal(lit))
            }
            Token::Ident(_) => {
                let line = self.cur.line;
                let Token::Ident(name) = self.cur.kind.clone() else {
                    unreachable!()
                };

                if self.next.kind == token!["["] {
                    let Some(ty) = self.lookup_var(&name) else {
                        return Err(ParseErr::Undefined(name).at(line));
                    };
                    if !ty.is_array() {
                        return Err(ParseErr::NotIndexable(name).at(line));
                    }
                    self.check_leaf(ty.element(), line)?;
                    Ok(Expr::Index(self.parse_index()?))
                } else if let Some(sig) = self.funcs.get(&name) {
                    let ret = sig.ret;
                    self.check_leaf(ret, line)?;
                    Ok(Expr::Call(self.parse_call()?))
                } else {
                    let Some(ty) = self.lookup_var(&name) else {
                        return Err(ParseErr::Undefined(name).at(line));
                    };
                    if ty.is_array() {
                        return Err(
                            ParseErr::TypeMismatch { expected: ty.element(), found: ty }.at(line)
                        );
                    }
                    self.check_leaf(ty, line)?;
                    self.advance()?;
                    Ok(Expr::Ident(name))
                }
            }
            _ => Err(ParseErr::ExpectedExpr.at(self.cur.line)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse_str(src: &str) -> ParseResult<(Program, FuncTable)> {
        parse(Lexer::new(Cursor::new(src)))
    }

    /// Assert that the source parses, returning the program.
    fn parse_ok(src: &str) -> Program {
        match parse_str(src) {
            Ok((program, _)) => program,
            Err(e) => panic!("{}", e.full_msg(src)),
        }
    }

    /// Assert that the source fails to parse with the given error and line.
    fn assert_parse_fail(src: &str, err: ParseErr, line: usize) {
        match parse_str(src) {
            Ok(_) => panic!("parsing succeeded on {src:?}"),
            Err(e) => {
                assert_eq!(*e.inner(), err, "on {src:?}");
                assert_eq!(e.line(), Some(line), "on {src:?}");
            }
        }
    }

    fn lit(v: i32) -> Expr {
        Expr::Literal(Literal::Int(v))
    }
    fn ident(s: &str) -> Expr {
        Expr::Ident(s.to_string())
    }
    fn arith(op: ArithOp, left: Expr, right: Expr) -> Expr {
        Expr::Arith(ArithExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    #[test]
    fn minimal_function() {
        let program = parse_ok("int f() { return 0; }");
        assert_eq!(program.funcs.len(), 1);

        let f = &program.funcs[0];
        assert_eq!(f.ret, Ty::Int);
        assert_eq!(f.name, "f");
        assert!(f.params.is_empty());
        assert_eq!(f.body, vec![Stmt::Return(RetStmt { value: Some(lit(0)) })]);
    }

    #[test]
    fn function_table_seeded() {
        let (_, funcs) = parse_str("int f() { return 0; }").unwrap();
        assert_eq!(funcs.len(), 3);
        assert!(funcs["printVarInt"].builtin);
        assert!(funcs["printVarFloat"].builtin);
        assert!(!funcs["f"].builtin);
        assert_eq!(funcs["f"].params, vec![]);
    }

    /// `1 + 2 * 3` groups as `1 + (2 * 3)`.
    #[test]
    fn precedence() {
        let program = parse_ok("int main() { return 1 + 2 * 3; }");
        let Stmt::Return(ret) = &program.funcs[0].body[0] else {
            panic!("expected return")
        };
        assert_eq!(
            ret.value,
            Some(arith(
                ArithOp::Add,
                lit(1),
                arith(ArithOp::Mul, lit(2), lit(3)),
            ))
        );
    }

    /// Parenthesized grouping overrides precedence.
    #[test]
    fn parens() {
        let program = parse_ok("int main() { return (1 + 2) * 3; }");
        let Stmt::Return(ret) = &program.funcs[0].body[0] else {
            panic!("expected return")
        };
        assert_eq!(
            ret.value,
            Some(arith(
                ArithOp::Mul,
                arith(ArithOp::Add, lit(1), lit(2)),
                lit(3),
            ))
        );
    }

    /// A bare declaration synthesizes a zero initializer.
    #[test]
    fn zero_initializer() {
        let program = parse_ok("int main() { int a; float b; return a; }");
        let body = &program.funcs[0].body;
        assert_eq!(
            body[0],
            Stmt::Assign(AssignStmt { target: ident("a"), value: lit(0) })
        );
        assert_eq!(
            body[1],
            Stmt::Assign(AssignStmt {
                target: ident("b"),
                value: Expr::Literal(Literal::Float(0.0)),
            })
        );
    }

    /// Unary minus desugars to `0 - operand`.
    #[test]
    fn unary_desugar() {
        let program = parse_ok("int main() { return -(1 + 2); }");
        let Stmt::Return(ret) = &program.funcs[0].body[0] else {
            panic!("expected return")
        };
        assert_eq!(
            ret.value,
            Some(arith(
                ArithOp::Sub,
                lit(0),
                arith(ArithOp::Add, lit(1), lit(2)),
            ))
        );
    }

    /// `a - -2` is a subtraction of the literal -2.
    #[test]
    fn negative_literal_vs_minus() {
        let program = parse_ok("int main() { int a = -3; int b = a - -2; return b; }");
        let body = &program.funcs[0].body;
        assert_eq!(
            body[0],
            Stmt::Assign(AssignStmt { target: ident("a"), value: lit(-3) })
        );
        assert_eq!(
            body[1],
            Stmt::Assign(AssignStmt {
                target: ident("b"),
                value: arith(ArithOp::Sub, ident("a"), lit(-2)),
            })
        );
    }

    #[test]
    fn array_declaration() {
        let program = parse_ok("int main() { int x[4] = {0, 1, 2, 3}; x[0] = x[1]; return 0; }");
        let body = &program.funcs[0].body;
        let Stmt::Assign(decl) = &body[0] else {
            panic!("expected declaration")
        };
        assert_eq!(
            decl.value,
            Expr::Array(ArrayExpr {
                len: 4,
                elems: vec![lit(0), lit(1), lit(2), lit(3)],
            })
        );
        assert_eq!(program.funcs[0].locals["x"], Ty::IntArray);
    }

    /// Pre-allocation form: length exactly 2, empty brace list.
    #[test]
    fn array_preallocation() {
        let program = parse_ok("int main() { float x[2] = {}; return 0; }");
        let Stmt::Assign(decl) = &program.funcs[0].body[0] else {
            panic!("expected declaration")
        };
        assert_eq!(decl.value, Expr::Array(ArrayExpr { len: 2, elems: vec![] }));
    }

    #[test]
    fn condition_operand_types() {
        let program = parse_ok(
            "int main() { float x = 1.5; while (x < 3.0) { x = x + 1.0; } \
             if (1 < 2) { return 1; } return 0; }",
        );
        let body = &program.funcs[0].body;
        let Stmt::While(w) = &body[1] else { panic!("expected while") };
        assert_eq!(w.cond.ty, Ty::Float);
        // an all-literal condition compares at int
        let Stmt::If(i) = &body[2] else { panic!("expected if") };
        assert_eq!(i.cond.ty, Ty::Int);
        assert_eq!(i.cond.op, CmpOp::Lt);
    }

    #[test]
    fn nested_loops_and_branches() {
        let program = parse_ok(
            "int main() {\n\
             \x20 int n = 0;\n\
             \x20 while (n < 10) {\n\
             \x20   for (int i = 0; i < 3; i = i + 1) {\n\
             \x20     if (i == 1) { n = n + i; } else { n = n + 1; }\n\
             \x20   }\n\
             \x20 }\n\
             \x20 return n;\n\
             }",
        );
        let Stmt::While(w) = &program.funcs[0].body[1] else {
            panic!("expected while")
        };
        let Stmt::For(l) = &w.body[0] else { panic!("expected for") };
        assert_eq!(l.scope["i"], Ty::Int);
        assert!(matches!(l.body[0], Stmt::If(_)));
    }

    #[test]
    fn call_statements() {
        let program = parse_ok(
            "int add(int a, int b) { return a + b; }\n\
             void main() { printVarInt(3); add(1, 2); }",
        );
        let body = &program.funcs[1].body;
        let Stmt::Call(c) = &body[0] else { panic!("expected call") };
        assert_eq!(c.kind, CallKind::Builtin);
        let Stmt::Call(c) = &body[1] else { panic!("expected call") };
        assert_eq!(c.kind, CallKind::User);
        assert_eq!(c.call.args.len(), 2);
    }

    /// Functions can call themselves: the signature is recorded before the
    /// body is parsed.
    #[test]
    fn recursion() {
        parse_ok(
            "int fact(int n) { if (n < 2) { return 1; } return n * fact(n - 1); }",
        );
    }

    #[test]
    fn void_return() {
        parse_ok("void f() { return; }");
        assert_parse_fail(
            "void f() { return 1; }",
            ParseErr::TypeMismatch { expected: Ty::Void, found: Ty::Int },
            1,
        );
    }

    #[test]
    fn redeclaration_fails() {
        assert_parse_fail(
            "int main() {\n  int a = 1;\n  int a = 2;\n  return a;\n}",
            ParseErr::Redeclared("a".to_string()),
            3,
        );
        // the whole live scope chain counts, not just the innermost scope
        assert_parse_fail(
            "int main() {\n  int a = 1;\n  if (a < 2) {\n    float a = 0.5;\n  }\n  return a;\n}",
            ParseErr::Redeclared("a".to_string()),
            4,
        );
    }

    #[test]
    fn builtin_name_clash_fails() {
        assert_parse_fail(
            "void printVarInt(int x) { return; }",
            ParseErr::Redeclared("printVarInt".to_string()),
            1,
        );
        assert_parse_fail(
            "int main() { int printVarInt = 1; return printVarInt; }",
            ParseErr::Redeclared("printVarInt".to_string()),
            1,
        );
    }

    #[test]
    fn undefined_name_fails() {
        assert_parse_fail(
            "int main() {\n  x = 1;\n  return 0;\n}",
            ParseErr::Undefined("x".to_string()),
            2,
        );
        assert_parse_fail(
            "int main() { return y; }",
            ParseErr::Undefined("y".to_string()),
            1,
        );
    }

    /// Mixing int and float inside one expression is fatal.
    #[test]
    fn type_mismatch_fails() {
        assert_parse_fail(
            "int main() { int a = 1; float b = 2.0; return a + b; }",
            ParseErr::TypeMismatch { expected: Ty::Int, found: Ty::Float },
            1,
        );
        assert_parse_fail(
            "int main() { int a = 2.5; return a; }",
            ParseErr::TypeMismatch { expected: Ty::Int, found: Ty::Float },
            1,
        );
    }

    #[test]
    fn bad_array_literals_fail() {
        assert_parse_fail(
            "int main() { int x[1] = {}; return 0; }",
            ParseErr::BadArrayLen,
            1,
        );
        assert_parse_fail(
            "int main() { int x[-2] = {}; return 0; }",
            ParseErr::BadArrayLen,
            1,
        );
        assert_parse_fail(
            "int main() { int x[3] = {1, 2}; return 0; }",
            ParseErr::BadArrayArity { len: 3, count: 2 },
            1,
        );
    }

    #[test]
    fn array_misuse_fails() {
        assert_parse_fail(
            "int main() { int x = 1; x[0] = 2; return x; }",
            ParseErr::NotIndexable("x".to_string()),
            1,
        );
        assert_parse_fail(
            "int main() { int x[2] = {}; x = 3; return 0; }",
            ParseErr::ArrayAssign("x".to_string()),
            1,
        );
    }

    #[test]
    fn wrong_arg_count_fails() {
        assert_parse_fail(
            "int main() { printVarInt(1, 2); return 0; }",
            ParseErr::WrongArgCount {
                name: "printVarInt".to_string(),
                expected: 1,
                found: 2,
            },
            1,
        );
    }

    #[test]
    fn illegal_token_fails() {
        assert_parse_fail(
            "int main() {\n  int a = 3a;\n  return a;\n}",
            ParseErr::IllegalToken("3a".to_string()),
            2,
        );
    }

    #[test]
    fn unsupported_return_type_fails() {
        assert_parse_fail("main() { return 0; }", ParseErr::UnsupportedRetType, 1);
    }
}
