// ==========================================
// 公式引擎 - 词法分析
// ==========================================
// 红线: 代码执行原语（import/require/eval...）在求值前拒绝
// ==========================================

use super::error::{FormulaError, FormulaResult};
use rust_decimal::Decimal;
use std::str::FromStr;

/// 禁止出现在表达式中的标识符
const FORBIDDEN_IDENTIFIERS: [&str; 8] = [
    "import",
    "require",
    "eval",
    "evaluate",
    "parse",
    "compile",
    "createUnit",
    "load",
];

/// 表达式最大长度（字符）
pub const MAX_EXPRESSION_LEN: usize = 4_096;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(Decimal),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    LParen,
    RParen,
    Comma,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// 将表达式切分为 Token 序列
pub fn tokenize(source: &str) -> FormulaResult<Vec<Token>> {
    if source.len() > MAX_EXPRESSION_LEN {
        return Err(FormulaError::syntax(0, "表达式过长"));
    }

    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit())) {
            let (value, next) = read_number(&chars, i)?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                position: start,
            });
            i = next;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            if FORBIDDEN_IDENTIFIERS.contains(&ident.as_str()) {
                return Err(FormulaError::DisallowedConstruct(ident));
            }
            tokens.push(Token {
                kind: TokenKind::Ident(ident),
                position: start,
            });
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (kind, width) = match (c, next) {
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('^', _) => (TokenKind::Caret, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('!', _) => (TokenKind::Bang, 1),
            ('=', _) => return Err(FormulaError::DisallowedConstruct("赋值 '='".to_string())),
            ('"' | '\'' | '`', _) => {
                return Err(FormulaError::DisallowedConstruct("字符串字面量".to_string()))
            }
            ('[' | ']' | '{' | '}', _) => {
                return Err(FormulaError::DisallowedConstruct(format!("结构符号 '{}'", c)))
            }
            (';', _) => return Err(FormulaError::DisallowedConstruct("多语句 ';'".to_string())),
            _ => return Err(FormulaError::syntax(start, format!("无法识别的字符 '{}'", c))),
        };
        tokens.push(Token { kind, position: start });
        i += width;
    }

    Ok(tokens)
}

/// 读取数字字面量（支持小数与科学计数法）
fn read_number(chars: &[char], start: usize) -> FormulaResult<(Decimal, usize)> {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }

    let mantissa_end = i;
    let mut has_exponent = false;
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            has_exponent = true;
            i = j;
        }
    }

    let text: String = chars[start..i].iter().collect();
    let mantissa: String = chars[start..mantissa_end].iter().collect();
    let mantissa = mantissa.trim_end_matches('.');
    let parsed = if has_exponent {
        let exponent: String = chars[mantissa_end..i].iter().collect();
        Decimal::from_scientific(&format!("{}{}", mantissa, exponent))
    } else {
        Decimal::from_str(mantissa)
    };

    parsed
        .map(|value| (value, i))
        .map_err(|e| FormulaError::syntax(start, format!("无效数字 '{}': {}", text, e)))
}
