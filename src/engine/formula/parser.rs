// ==========================================
// 公式引擎 - 表达式解析
// ==========================================
// 封闭语法（优先级由低到高）:
//   or  ->  and  ->  not  ->  比较  ->  加减  ->  乘除模  ->  一元正负  ->  幂(右结合)  ->  原子
// 函数调用只允许白名单 Function，未知函数在解析期拒绝
// ==========================================

use super::error::{FormulaError, FormulaResult};
use super::lexer::{tokenize, Token, TokenKind};
use rust_decimal::Decimal;

/// 最大嵌套深度
const MAX_DEPTH: usize = 64;

// ==========================================
// AST
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Decimal),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// 白名单函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Add,
    Subtract,
    Multiply,
    Divide,
    Pow,
    Sqrt,
    Abs,
    Round,
    Floor,
    Ceil,
    Min,
    Max,
    Mean,
    Sum,
    Median,
    Mod,
    Log,
    Log10,
    Exp,
    Greater,
    Smaller,
    Equal,
    Larger,
    LargerEq,
    SmallerEq,
    And,
    Or,
    Not,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let f = match name {
            "add" => Function::Add,
            "subtract" => Function::Subtract,
            "multiply" => Function::Multiply,
            "divide" => Function::Divide,
            "pow" => Function::Pow,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "round" => Function::Round,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "min" => Function::Min,
            "max" => Function::Max,
            "mean" => Function::Mean,
            "sum" => Function::Sum,
            "median" => Function::Median,
            "mod" => Function::Mod,
            "log" => Function::Log,
            "log10" => Function::Log10,
            "exp" => Function::Exp,
            "greater" => Function::Greater,
            "smaller" => Function::Smaller,
            "equal" => Function::Equal,
            "larger" => Function::Larger,
            "largerEq" => Function::LargerEq,
            "smallerEq" => Function::SmallerEq,
            "and" => Function::And,
            "or" => Function::Or,
            "not" => Function::Not,
            _ => return None,
        };
        Some(f)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Add => "add",
            Function::Subtract => "subtract",
            Function::Multiply => "multiply",
            Function::Divide => "divide",
            Function::Pow => "pow",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Min => "min",
            Function::Max => "max",
            Function::Mean => "mean",
            Function::Sum => "sum",
            Function::Median => "median",
            Function::Mod => "mod",
            Function::Log => "log",
            Function::Log10 => "log10",
            Function::Exp => "exp",
            Function::Greater => "greater",
            Function::Smaller => "smaller",
            Function::Equal => "equal",
            Function::Larger => "larger",
            Function::LargerEq => "largerEq",
            Function::SmallerEq => "smallerEq",
            Function::And => "and",
            Function::Or => "or",
            Function::Not => "not",
        }
    }

    /// 参数个数范围 (min, max)，max 为 None 表示不限
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Add | Function::Multiply => (2, None),
            Function::Min | Function::Max | Function::Mean | Function::Sum | Function::Median => {
                (1, None)
            }
            Function::Round | Function::Log => (1, Some(2)),
            Function::Sqrt
            | Function::Abs
            | Function::Floor
            | Function::Ceil
            | Function::Log10
            | Function::Exp
            | Function::Not => (1, Some(1)),
            Function::Subtract
            | Function::Divide
            | Function::Pow
            | Function::Mod
            | Function::Greater
            | Function::Smaller
            | Function::Equal
            | Function::Larger
            | Function::LargerEq
            | Function::SmallerEq
            | Function::And
            | Function::Or => (2, Some(2)),
        }
    }

    fn check_arity(&self, actual: usize) -> FormulaResult<()> {
        let (min, max) = self.arity();
        let ok = actual >= min && max.map_or(true, |m| actual <= m);
        if ok {
            return Ok(());
        }
        let expected = match max {
            Some(m) if m == min => format!("{}", min),
            Some(m) => format!("{}..{}", min, m),
            None => format!(">={}", min),
        };
        Err(FormulaError::Arity {
            function: self.name().to_string(),
            expected,
            actual,
        })
    }
}

// ==========================================
// Parser
// ==========================================

/// 解析表达式文本为 AST
pub fn parse_expression(source: &str) -> FormulaResult<Expr> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(FormulaError::syntax(0, "表达式为空"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        source_len: source.len(),
    };
    let expr = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        return Err(FormulaError::syntax(
            token.position,
            format!("多余的输入: {:?}", token.kind),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    source_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn current_position(&self) -> usize {
        self.peek().map_or(self.source_len, |t| t.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_ident(&self, word: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(s)) if s == word)
    }

    fn peek_next_is_lparen(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::LParen)
        )
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> FormulaResult<()> {
        match self.peek_kind() {
            Some(k) if *k == kind => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(FormulaError::syntax(
                self.current_position(),
                format!("期望 {}", what),
            )),
        }
    }

    fn enter(&mut self) -> FormulaResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::syntax(self.current_position(), "表达式嵌套过深"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    // ===== or =====
    fn parse_or(&mut self) -> FormulaResult<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            let is_or = matches!(self.peek_kind(), Some(TokenKind::OrOr))
                || (self.peek_ident("or") && !self.peek_next_is_lparen());
            if !is_or {
                break;
            }
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Self::binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    // ===== and =====
    fn parse_and(&mut self) -> FormulaResult<Expr> {
        let mut lhs = self.parse_not()?;
        loop {
            let is_and = matches!(self.peek_kind(), Some(TokenKind::AndAnd))
                || (self.peek_ident("and") && !self.peek_next_is_lparen());
            if !is_and {
                break;
            }
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Self::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    // ===== not =====
    fn parse_not(&mut self) -> FormulaResult<Expr> {
        let is_not = matches!(self.peek_kind(), Some(TokenKind::Bang))
            || (self.peek_ident("not") && !self.peek_next_is_lparen());
        if is_not {
            self.advance();
            self.enter()?;
            let operand = self.parse_not()?;
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    // ===== 比较 =====
    fn parse_comparison(&mut self) -> FormulaResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Le) => BinaryOp::Le,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::Ge) => BinaryOp::Ge,
                Some(TokenKind::EqEq) => BinaryOp::Eq,
                Some(TokenKind::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    // ===== 加减 =====
    fn parse_additive(&mut self) -> FormulaResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    // ===== 乘除模 =====
    fn parse_multiplicative(&mut self) -> FormulaResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    // ===== 一元正负 =====
    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Plus) => Some(UnaryOp::Plus),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                self.enter()?;
                let operand = self.parse_unary()?;
                self.leave();
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.parse_power(),
        }
    }

    // ===== 幂（右结合，指数允许一元负号）=====
    fn parse_power(&mut self) -> FormulaResult<Expr> {
        let base = self.parse_primary()?;
        if matches!(self.peek_kind(), Some(TokenKind::Caret)) {
            self.advance();
            self.enter()?;
            let exponent = self.parse_unary()?;
            self.leave();
            return Ok(Self::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    // ===== 原子 =====
    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        let position = self.current_position();
        let token = self
            .advance()
            .ok_or_else(|| FormulaError::syntax(position, "表达式意外结束"))?;

        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::LParen => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.leave();
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if matches!(self.peek_kind(), Some(TokenKind::LParen)) {
                    return self.parse_call(&name, token.position);
                }
                match name.as_str() {
                    "true" => Ok(Expr::Number(Decimal::ONE)),
                    "false" => Ok(Expr::Number(Decimal::ZERO)),
                    _ => Ok(Expr::Variable(name)),
                }
            }
            other => Err(FormulaError::syntax(
                token.position,
                format!("意外的符号: {:?}", other),
            )),
        }
    }

    fn parse_call(&mut self, name: &str, position: usize) -> FormulaResult<Expr> {
        let function = Function::from_name(name).ok_or_else(|| {
            FormulaError::DisallowedConstruct(format!("函数 {} 不在白名单内 (位置 {})", name, position))
        })?;

        self.expect(TokenKind::LParen, "'('")?;
        self.enter()?;

        let mut args = Vec::new();
        if !matches!(self.peek_kind(), Some(TokenKind::RParen)) {
            loop {
                args.push(self.parse_or()?);
                if matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                    self.advance();
                    continue;
                }
                break;
            }
        }

        self.leave();
        self.expect(TokenKind::RParen, "')'")?;
        function.check_arity(args.len())?;

        Ok(Expr::Call { function, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: i64) -> Expr {
        Expr::Number(Decimal::from(v))
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Parser::binary(BinaryOp::Add, num(1), Parser::binary(BinaryOp::Mul, num(2), num(3)))
        );
    }

    #[test]
    fn test_power_right_associative() {
        let expr = parse_expression("2 ^ 3 ^ 2").unwrap();
        assert_eq!(
            expr,
            Parser::binary(BinaryOp::Pow, num(2), Parser::binary(BinaryOp::Pow, num(3), num(2)))
        );
    }

    #[test]
    fn test_unknown_function_rejected() {
        let err = parse_expression("system(1)").unwrap_err();
        assert!(matches!(err, FormulaError::DisallowedConstruct(_)));
    }

    #[test]
    fn test_arity_checked_at_parse_time() {
        let err = parse_expression("sqrt(1, 2)").unwrap_err();
        assert!(matches!(err, FormulaError::Arity { .. }));
        let err = parse_expression("subtract(1)").unwrap_err();
        assert!(matches!(err, FormulaError::Arity { .. }));
    }

    #[test]
    fn test_keyword_operators_and_function_forms() {
        assert!(parse_expression("a > 1 and not b or c").is_ok());
        assert!(parse_expression("and(a, b)").is_ok());
        assert!(parse_expression("not(a)").is_ok());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse_expression(""), Err(FormulaError::Syntax { .. })));
        assert!(matches!(parse_expression("(1 + 2"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(parse_expression("1 +"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(parse_expression("1 2"), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(parse_expression(&deep), Err(FormulaError::Syntax { .. })));
    }
}
