use crate::bail_syntax_at;
use crate::error::{CompilerError, Result};
use crate::lexer::{SpannedToken, Token, tokenize};
use crate::syntax::*;
use log::trace;

/// Tokenize and parse a whole translation unit.
pub fn parse(source: &str) -> Result<TranslationUnit> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse()
}

/// Deepest syntax tree the parser builds. Analysis recurses over the same
/// tree, so this also bounds its stack use.
const MAX_NESTING: usize = 64;

pub struct Parser {
    tokens: Vec<SpannedToken>,
    current: usize,
    /// Open expression and statement levels, checked against `MAX_NESTING`.
    depth: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<SpannedToken>) -> Self {
        if !matches!(tokens.last(), Some(t) if t.token == Token::Eof) {
            let span = tokens.last().map(|t| t.span).unwrap_or(Span::new(1, 1));
            tokens.push(SpannedToken { token: Token::Eof, span });
        }
        Parser {
            tokens,
            current: 0,
            depth: 0,
        }
    }

    pub fn parse(&mut self) -> Result<TranslationUnit> {
        let mut items = Vec::new();
        while !self.is_at_end() {
            items.push(self.parse_item()?);
        }
        Ok(TranslationUnit { items })
    }

    fn parse_item(&mut self) -> Result<Item> {
        trace!("parse_item: next token = {:?}", self.peek());
        match self.peek() {
            Token::AttributeStart => Ok(Item::Property(self.parse_property()?)),
            Token::Vertex | Token::Fragment => Ok(Item::Stage(self.parse_stage()?)),
            Token::Void => {
                self.advance();
                let name = self.expect_identifier()?;
                Ok(Item::Function(self.parse_function_rest(None, name)?))
            }
            Token::Uniform | Token::Varying | Token::In | Token::Out | Token::Const => {
                let qualifier = match self.advance().token {
                    Token::Uniform => Qualifier::Uniform,
                    Token::Varying => Qualifier::Varying,
                    Token::In => Qualifier::In,
                    Token::Out => Qualifier::Out,
                    _ => Qualifier::Const,
                };
                let ty = self.parse_type()?;
                let name = self.expect_identifier()?;
                Ok(Item::Global(self.parse_global_rest(Some(qualifier), ty, name)?))
            }
            Token::Identifier(_) => {
                let ty = self.parse_type()?;
                let name = self.expect_identifier()?;
                if self.check(&Token::LeftParen) {
                    Ok(Item::Function(self.parse_function_rest(Some(ty), name)?))
                } else {
                    Ok(Item::Global(self.parse_global_rest(None, ty, name)?))
                }
            }
            other => bail_syntax_at!(self.span(), "expected declaration, found {:?}", other),
        }
    }

    /// `#[key]` or `#[key = value]`; a bare key means `true`. Numeric values
    /// may be negated.
    fn parse_property(&mut self) -> Result<Property> {
        trace!("parse_property: next token = {:?}", self.peek());
        self.expect(Token::AttributeStart)?;
        let key = self.expect_identifier()?;
        let value = if self.match_token(&Token::Assign) {
            let negative = self.match_token(&Token::Minus);
            let span = self.span();
            match self.advance().token.clone() {
                Token::IntLiteral(n) => (if negative { -n } else { n }).to_string(),
                Token::FloatLiteral(f) => (if negative { -f } else { f }).to_string(),
                other if negative => bail_syntax_at!(span, "expected a number after '-', found {:?}", other),
                Token::StringLiteral(s) => s,
                Token::True => "true".to_string(),
                Token::False => "false".to_string(),
                Token::Identifier(name) => name,
                other => bail_syntax_at!(span, "expected property value, found {:?}", other),
            }
        } else {
            "true".to_string()
        };
        self.expect(Token::RightBracket)?;
        Ok(Property { key, value })
    }

    fn parse_stage(&mut self) -> Result<StageBlock> {
        trace!("parse_stage: next token = {:?}", self.peek());
        let span = self.span();
        let stage = match self.advance().token {
            Token::Vertex => Stage::Vertex,
            _ => Stage::Fragment,
        };
        let mut inputs = Vec::new();
        if self.check(&Token::LeftParen) {
            if stage == Stage::Vertex {
                bail_syntax_at!(self.span(), "the vertex stage takes no inputs");
            }
            inputs = self.parse_params()?;
        }
        let body = self.parse_block()?;
        Ok(StageBlock { stage, inputs, body, span })
    }

    fn parse_function_rest(&mut self, ret: Option<TypeSpec>, name: Ident) -> Result<FunctionDef> {
        trace!("parse_function_rest({}): next token = {:?}", name.name, self.peek());
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(FunctionDef { ret, name, params, body })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>> {
        self.expect(Token::LeftParen)?;
        let mut params = Vec::new();
        if !self.check(&Token::RightParen) {
            loop {
                let mut ty = self.parse_type()?;
                let name = self.expect_identifier()?;
                self.parse_declarator_suffix(&mut ty)?;
                params.push(Param { ty, name });
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RightParen)?;
        Ok(params)
    }

    fn parse_global_rest(&mut self, qualifier: Option<Qualifier>, mut ty: TypeSpec, name: Ident) -> Result<GlobalDecl> {
        trace!("parse_global_rest({}): next token = {:?}", name.name, self.peek());
        self.parse_declarator_suffix(&mut ty)?;
        let init = if self.match_token(&Token::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(Token::Semicolon)?;
        Ok(GlobalDecl { qualifier, ty, name, init })
    }

    /// `T name` or `T[N] name`.
    fn parse_type(&mut self) -> Result<TypeSpec> {
        trace!("parse_type: next token = {:?}", self.peek());
        let span = self.span();
        let name = match self.peek() {
            Token::Identifier(name) => name.clone(),
            other => bail_syntax_at!(span, "expected type name, found {:?}", other),
        };
        self.advance();
        let mut ty = TypeSpec { name, array_len: None, span };
        if self.check(&Token::LeftBracket) {
            ty.array_len = Some(self.parse_array_len()?);
        }
        Ok(ty)
    }

    /// C-style `name[N]` after a declarator.
    fn parse_declarator_suffix(&mut self, ty: &mut TypeSpec) -> Result<()> {
        if self.check(&Token::LeftBracket) {
            if ty.array_len.is_some() {
                bail_syntax_at!(self.span(), "arrays of arrays are not supported");
            }
            ty.array_len = Some(self.parse_array_len()?);
        }
        Ok(())
    }

    fn parse_array_len(&mut self) -> Result<usize> {
        self.expect(Token::LeftBracket)?;
        let span = self.span();
        let len = match self.advance().token {
            Token::IntLiteral(n) if n > 0 => n as usize,
            Token::IntLiteral(_) => bail_syntax_at!(span, "array length must be positive"),
            ref other => bail_syntax_at!(span, "expected array length, found {:?}", other),
        };
        self.expect(Token::RightBracket)?;
        if self.check(&Token::LeftBracket) {
            bail_syntax_at!(self.span(), "arrays of arrays are not supported");
        }
        Ok(len)
    }

    fn parse_block(&mut self) -> Result<Block> {
        trace!("parse_block: next token = {:?}", self.peek());
        let span = self.span();
        self.expect(Token::LeftBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RightBrace) {
            if self.is_at_end() {
                bail_syntax_at!(self.span(), "expected RightBrace to close block opened at {}", span);
            }
            stmts.push(self.parse_statement()?);
        }
        self.expect(Token::RightBrace)?;
        Ok(Block { stmts, span })
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        self.descend("statement")?;
        let stmt = self.parse_statement_kind()?;
        self.depth -= 1;
        Ok(stmt)
    }

    fn parse_statement_kind(&mut self) -> Result<Stmt> {
        trace!("parse_statement: next token = {:?}", self.peek());
        let span = self.span();
        let kind = match self.peek() {
            Token::LeftBrace => StmtKind::Block(self.parse_block()?),
            Token::If => {
                self.advance();
                self.expect(Token::LeftParen)?;
                let cond = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                let then_branch = Box::new(self.parse_statement()?);
                let else_branch = if self.match_token(&Token::Else) {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                StmtKind::If { cond, then_branch, else_branch }
            }
            Token::While => {
                self.advance();
                self.expect(Token::LeftParen)?;
                let cond = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::While { cond, body }
            }
            Token::For => return self.parse_for(),
            Token::Return => {
                self.advance();
                let value = if self.check(&Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(Token::Semicolon)?;
                StmtKind::Return(value)
            }
            Token::Discard | Token::Break | Token::Continue => {
                let kind = match self.advance().token {
                    Token::Discard => StmtKind::Discard,
                    Token::Break => StmtKind::Break,
                    _ => StmtKind::Continue,
                };
                self.expect(Token::Semicolon)?;
                kind
            }
            _ => {
                let stmt = self.parse_simple_statement()?;
                self.expect(Token::Semicolon)?;
                return Ok(stmt);
            }
        };
        Ok(Stmt::new(span, kind))
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        trace!("parse_for: next token = {:?}", self.peek());
        let span = self.span();
        self.expect(Token::For)?;
        self.expect(Token::LeftParen)?;
        let init = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.expect(Token::Semicolon)?;
        let cond = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(Token::Semicolon)?;
        let step = if self.check(&Token::RightParen) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.expect(Token::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::new(span, StmtKind::For { init, cond, step, body }))
    }

    /// Declaration, assignment, increment or expression, without the `;`.
    fn parse_simple_statement(&mut self) -> Result<Stmt> {
        trace!("parse_simple_statement: next token = {:?}", self.peek());
        let span = self.span();
        if self.at_local_declaration() {
            let mut ty = self.parse_type()?;
            let name = self.expect_identifier()?;
            self.parse_declarator_suffix(&mut ty)?;
            let init = if self.match_token(&Token::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            return Ok(Stmt::new(span, StmtKind::Local { ty, name, init }));
        }

        let target = self.parse_expression()?;
        let op = match self.peek() {
            Token::Assign => AssignOp::Assign,
            Token::PlusAssign => AssignOp::Compound(BinaryOp::Add),
            Token::MinusAssign => AssignOp::Compound(BinaryOp::Sub),
            Token::StarAssign => AssignOp::Compound(BinaryOp::Mul),
            Token::SlashAssign => AssignOp::Compound(BinaryOp::Div),
            Token::PlusPlus | Token::MinusMinus => {
                let op = if self.advance().token == Token::PlusPlus { BinaryOp::Add } else { BinaryOp::Sub };
                return Ok(Stmt::new(span, StmtKind::Increment { target, op }));
            }
            _ => return Ok(Stmt::new(span, StmtKind::Expr(target))),
        };
        self.advance();
        let value = self.parse_expression()?;
        Ok(Stmt::new(span, StmtKind::Assign { target, op, value }))
    }

    /// `T name` or `T[N] name` ahead.
    fn at_local_declaration(&self) -> bool {
        match (self.peek(), self.peek_nth(1)) {
            (Token::Identifier(_), Token::Identifier(_)) => true,
            (Token::Identifier(_), Token::LeftBracket) => matches!(
                (self.peek_nth(2), self.peek_nth(3), self.peek_nth(4)),
                (Token::IntLiteral(_), Token::RightBracket, Token::Identifier(_))
            ),
            _ => false,
        }
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        trace!("parse_expression: next token = {:?}", self.peek());
        self.parse_binary_expression_with_precedence(0)
    }

    fn get_operator_precedence(token: &Token) -> Option<(BinaryOp, i32)> {
        // Higher precedence binds tighter; all operators are left-associative
        match token {
            Token::OrOr => Some((BinaryOp::Or, 0)),
            Token::AndAnd => Some((BinaryOp::And, 1)),
            Token::EqEq => Some((BinaryOp::Eq, 2)),
            Token::NotEq => Some((BinaryOp::Ne, 2)),
            Token::Lt => Some((BinaryOp::Lt, 3)),
            Token::Le => Some((BinaryOp::Le, 3)),
            Token::Gt => Some((BinaryOp::Gt, 3)),
            Token::Ge => Some((BinaryOp::Ge, 3)),
            Token::Plus => Some((BinaryOp::Add, 4)),
            Token::Minus => Some((BinaryOp::Sub, 4)),
            Token::Star => Some((BinaryOp::Mul, 5)),
            Token::Slash => Some((BinaryOp::Div, 5)),
            Token::Percent => Some((BinaryOp::Rem, 5)),
            _ => None,
        }
    }

    fn parse_binary_expression_with_precedence(&mut self, min_precedence: i32) -> Result<Expr> {
        trace!(
            "parse_binary_expression_with_precedence({}): next token = {:?}",
            min_precedence,
            self.peek()
        );
        let mut left = self.parse_unary_expression()?;

        // Each operator nests the chain built so far one level deeper
        let depth = self.depth;
        loop {
            let (op, precedence) = match Self::get_operator_precedence(self.peek()) {
                Some(p) => p,
                None => break,
            };
            if precedence < min_precedence {
                break;
            }
            self.descend("expression")?;

            // Binary nodes are located at their operator
            let span = self.advance().span;
            let right = self.parse_binary_expression_with_precedence(precedence + 1)?;
            left = Expr::new(
                span,
                ExprKind::Binary {
                    op,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
            );
        }
        self.depth = depth;

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<Expr> {
        trace!("parse_unary_expression: next token = {:?}", self.peek());
        self.descend("expression")?;
        let op = match self.peek() {
            Token::Minus => Some(UnaryOp::Neg),
            Token::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        let expr = match op {
            Some(op) => {
                let span = self.advance().span;
                let operand = self.parse_unary_expression()?;
                Expr::new(span, ExprKind::Unary { op, operand: Box::new(operand) })
            }
            None => self.parse_postfix_expression()?,
        };
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_postfix_expression(&mut self) -> Result<Expr> {
        trace!("parse_postfix_expression: next token = {:?}", self.peek());
        let mut expr = self.parse_primary_expression()?;

        let depth = self.depth;
        loop {
            if matches!(self.peek(), Token::LeftBracket | Token::Dot) {
                self.descend("expression")?;
            }
            match self.peek() {
                Token::LeftBracket => {
                    let span = self.advance().span;
                    let index = self.parse_expression()?;
                    self.expect(Token::RightBracket)?;
                    expr = Expr::new(
                        span,
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                    );
                }
                Token::Dot => {
                    self.advance();
                    let field = self.expect_identifier()?;
                    expr = Expr::new(
                        field.span,
                        ExprKind::Member {
                            base: Box::new(expr),
                            field,
                        },
                    );
                }
                _ => break,
            }
        }
        self.depth = depth;

        Ok(expr)
    }

    fn parse_primary_expression(&mut self) -> Result<Expr> {
        trace!("parse_primary_expression: next token = {:?}", self.peek());
        let span = self.span();
        let kind = match self.peek().clone() {
            Token::IntLiteral(n) => {
                self.advance();
                ExprKind::IntLiteral(n)
            }
            Token::FloatLiteral(f) => {
                self.advance();
                ExprKind::FloatLiteral(f)
            }
            Token::True | Token::False => {
                let value = self.advance().token == Token::True;
                ExprKind::BoolLiteral(value)
            }
            Token::Identifier(name) => {
                // `T[N](...)` is an array constructor, never an index
                let array_constructor = matches!(
                    (self.peek_nth(1), self.peek_nth(2), self.peek_nth(3), self.peek_nth(4)),
                    (Token::LeftBracket, Token::IntLiteral(_), Token::RightBracket, Token::LeftParen)
                );
                if array_constructor {
                    let ty = self.parse_type()?;
                    let args = self.parse_arguments()?;
                    ExprKind::ArrayConstructor { ty, args }
                } else {
                    self.advance();
                    if self.check(&Token::LeftParen) {
                        let args = self.parse_arguments()?;
                        ExprKind::Call {
                            callee: Ident { name, span },
                            args,
                        }
                    } else {
                        ExprKind::Identifier(name)
                    }
                }
            }
            Token::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                return Ok(inner);
            }
            other => bail_syntax_at!(span, "expected expression, found {:?}", other),
        };
        Ok(Expr::new(span, kind))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        self.expect(Token::LeftParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RightParen)?;
        Ok(args)
    }

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    /// Open one more nesting level, failing once the tree gets too deep.
    fn descend(&mut self, what: &str) -> Result<()> {
        if self.depth >= MAX_NESTING {
            bail_syntax_at!(self.span(), "{} nested too deeply", what);
        }
        self.depth += 1;
        Ok(())
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let index = (self.current + n).min(self.tokens.len() - 1);
        &self.tokens[index].token
    }

    fn span(&self) -> Span {
        self.tokens[self.current.min(self.tokens.len() - 1)].span
    }

    /// Consume the current token. Never moves past `Eof`.
    fn advance(&mut self) -> &SpannedToken {
        let index = self.current.min(self.tokens.len() - 1);
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[index]
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn match_token(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.check(&token) {
            self.advance();
            Ok(())
        } else {
            Err(CompilerError::SyntaxError(
                format!("expected {:?}, found {:?}", token, self.peek()),
                Some(self.span()),
            ))
        }
    }

    fn expect_identifier(&mut self) -> Result<Ident> {
        let span = self.span();
        match self.peek() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(Ident { name, span })
            }
            other => bail_syntax_at!(span, "expected identifier, found {:?}", other),
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }
}
