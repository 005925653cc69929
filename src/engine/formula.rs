// ==========================================
// 生产派工核心 - 工艺模板公式
// ==========================================
// 职责: 将模板中的文本公式编译为类型化表达式树, 按显式变量绑定求值
// 语法: 数字 / 变量 / 一元 - ! / + - * / / 比较 < <= > >= == != / && ||
// 红线: 未知字符/运算符在编译期报错; 求值时未知变量报错, 不做文本替换
// ==========================================

use crate::domain::routing::RoutingTemplate;
use crate::engine::error::{DispatchError, DispatchResult};
use std::collections::HashMap;
use std::fmt;

// ==========================================
// 表达式树
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// 求值结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Num(f64),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// 变量绑定
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<String, f64>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    /// 批量绑定并加前缀 (例: 原材料属性绑定为 rm_xxx)
    pub fn extend_prefixed<'a>(
        &mut self,
        prefix: &str,
        attrs: impl IntoIterator<Item = (&'a String, &'a f64)>,
    ) -> &mut Self {
        for (k, v) in attrs {
            self.values.insert(format!("{}{}", prefix, k), *v);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

// ==========================================
// 词法分析
// ==========================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(src: &str) -> DispatchResult<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| DispatchError::FormulaError(format!("非法数字 '{}' ({})", text, src)))?;
            tokens.push(Token::Number(n));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (op, width): (&'static str, usize) = match (c, next) {
            ('<', Some('=')) => ("<=", 2),
            ('>', Some('=')) => (">=", 2),
            ('=', Some('=')) => ("==", 2),
            ('!', Some('=')) => ("!=", 2),
            ('&', Some('&')) => ("&&", 2),
            ('|', Some('|')) => ("||", 2),
            ('<', _) => ("<", 1),
            ('>', _) => (">", 1),
            ('!', _) => ("!", 1),
            ('+', _) => ("+", 1),
            ('-', _) => ("-", 1),
            ('*', _) => ("*", 1),
            ('/', _) => ("/", 1),
            ('(', _) => {
                tokens.push(Token::LParen);
                i += 1;
                continue;
            }
            (')', _) => {
                tokens.push(Token::RParen);
                i += 1;
                continue;
            }
            _ => {
                return Err(DispatchError::FormulaError(format!(
                    "未知运算符 '{}' 位于第{}个字符 ({})",
                    c,
                    i + 1,
                    src
                )))
            }
        };
        tokens.push(Token::Op(op));
        i += width;
    }

    Ok(tokens)
}

// ==========================================
// 语法分析 (递归下降)
// ==========================================
// or      := and ( "||" and )*
// and     := cmp ( "&&" cmp )*
// cmp     := sum ( ("<"|"<="|">"|">="|"=="|"!=") sum )?
// sum     := product ( ("+"|"-") product )*
// product := unary ( ("*"|"/") unary )*
// unary   := ("-"|"!") unary | primary
// primary := number | ident | "(" or ")"

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    src: &'a str,
}

impl<'a> Parser<'a> {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn error(&self, msg: &str) -> DispatchError {
        DispatchError::FormulaError(format!("{} ({})", msg, self.src))
    }

    fn parse_or(&mut self) -> DispatchResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek_op() == Some("||") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> DispatchResult<Expr> {
        let mut lhs = self.parse_cmp()?;
        while self.peek_op() == Some("&&") {
            self.pos += 1;
            let rhs = self.parse_cmp()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> DispatchResult<Expr> {
        let lhs = self.parse_sum()?;
        let op = match self.peek_op() {
            Some("<") => BinaryOp::Lt,
            Some("<=") => BinaryOp::Le,
            Some(">") => BinaryOp::Gt,
            Some(">=") => BinaryOp::Ge,
            Some("==") => BinaryOp::Eq,
            Some("!=") => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_sum()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_sum(&mut self) -> DispatchResult<Expr> {
        let mut lhs = self.parse_product()?;
        loop {
            let op = match self.peek_op() {
                Some("+") => BinaryOp::Add,
                Some("-") => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_product()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_product(&mut self) -> DispatchResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_op() {
                Some("*") => BinaryOp::Mul,
                Some("/") => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> DispatchResult<Expr> {
        match self.peek_op() {
            Some("-") => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)))
            }
            Some("!") => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> DispatchResult<Expr> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match token {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error("缺少右括号")),
                }
            }
            Some(Token::Op(op)) => Err(self.error(&format!("意外的运算符 '{}'", op))),
            Some(Token::RParen) => Err(self.error("意外的右括号")),
            None => Err(self.error("表达式不完整")),
        }
    }
}

impl Expr {
    /// 编译文本公式
    pub fn compile(src: &str) -> DispatchResult<Expr> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(DispatchError::FormulaError("空公式".to_string()));
        }
        let mut parser = Parser { tokens, pos: 0, src };
        let expr = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error("公式末尾存在多余内容"));
        }
        Ok(expr)
    }

    /// 求值
    pub fn eval(&self, bindings: &Bindings) -> DispatchResult<Value> {
        match self {
            Expr::Number(n) => Ok(Value::Num(*n)),
            Expr::Var(name) => bindings
                .get(name)
                .map(Value::Num)
                .ok_or_else(|| DispatchError::FormulaError(format!("未绑定的变量: {}", name))),
            Expr::Unary(UnaryOp::Neg, inner) => Ok(Value::Num(-inner.eval_num(bindings)?)),
            Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!inner.eval_bool(bindings)?)),
            Expr::Binary(op, lhs, rhs) => match op {
                BinaryOp::And => Ok(Value::Bool(lhs.eval_bool(bindings)? && rhs.eval_bool(bindings)?)),
                BinaryOp::Or => Ok(Value::Bool(lhs.eval_bool(bindings)? || rhs.eval_bool(bindings)?)),
                _ => apply_numeric(*op, lhs.eval_num(bindings)?, rhs.eval_num(bindings)?),
            },
        }
    }

    pub fn eval_num(&self, bindings: &Bindings) -> DispatchResult<f64> {
        match self.eval(bindings)? {
            Value::Num(n) => Ok(n),
            Value::Bool(_) => Err(DispatchError::FormulaError(
                "期望数值, 得到布尔值".to_string(),
            )),
        }
    }

    pub fn eval_bool(&self, bindings: &Bindings) -> DispatchResult<bool> {
        match self.eval(bindings)? {
            Value::Bool(b) => Ok(b),
            Value::Num(_) => Err(DispatchError::FormulaError(
                "期望布尔值, 得到数值".to_string(),
            )),
        }
    }
}

fn apply_numeric(op: BinaryOp, a: f64, b: f64) -> DispatchResult<Value> {
    Ok(match op {
        BinaryOp::Add => Value::Num(a + b),
        BinaryOp::Sub => Value::Num(a - b),
        BinaryOp::Mul => Value::Num(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(DispatchError::FormulaError("除数为 0".to_string()));
            }
            Value::Num(a / b)
        }
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
        BinaryOp::Eq => Value::Bool(a == b),
        BinaryOp::Ne => Value::Bool(a != b),
        BinaryOp::And | BinaryOp::Or => {
            return Err(DispatchError::FormulaError(
                "逻辑运算符不能作用于数值".to_string(),
            ))
        }
    })
}

// ==========================================
// CompiledTemplate - 已编译的工艺模板公式
// ==========================================
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub template_id: String,
    rm_qty: Option<Expr>,
    rules: Vec<(String, Expr)>,
}

impl CompiledTemplate {
    /// 编译模板的原材料数量公式与限制规则
    pub fn compile(template: &RoutingTemplate) -> DispatchResult<Self> {
        let rm_qty = template
            .rm_qty_formula
            .as_deref()
            .map(Expr::compile)
            .transpose()?;
        let rules = template
            .rm_rules
            .iter()
            .map(|r| Expr::compile(r).map(|e| (r.clone(), e)))
            .collect::<DispatchResult<Vec<_>>>()?;

        tracing::debug!(template_id = %template.template_id, rules = rules.len(), "工艺模板公式编译完成");
        Ok(Self {
            template_id: template.template_id.clone(),
            rm_qty,
            rules,
        })
    }

    /// 原材料计算数量; 未配置公式时为 None
    pub fn calculated_qty(&self, bindings: &Bindings) -> DispatchResult<Option<f64>> {
        self.rm_qty.as_ref().map(|e| e.eval_num(bindings)).transpose()
    }

    /// 不满足的限制规则 (原文)
    pub fn failing_rules(&self, bindings: &Bindings) -> DispatchResult<Vec<String>> {
        let mut failing = Vec::new();
        for (text, expr) in &self.rules {
            if !expr.eval_bool(bindings)? {
                failing.push(text.clone());
            }
        }
        Ok(failing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        let mut b = Bindings::new();
        b.set("fg_qty", 10.0).set("oal_mm", 75.0).set("rm_oal_mm", 300.0).set("d1_mm", 6.0);
        b
    }

    #[test]
    fn test_arithmetic_precedence() {
        let e = Expr::compile("fg_qty * oal_mm / rm_oal_mm + 1").unwrap();
        assert_eq!(e.eval_num(&bindings()).unwrap(), 3.5);
        let e = Expr::compile("-(2 + 3) * 2").unwrap();
        assert_eq!(e.eval_num(&Bindings::new()).unwrap(), -10.0);
    }

    #[test]
    fn test_boolean_rules() {
        let mut b = bindings();
        b.set("rm_d1_mm", 7.0);
        let e = Expr::compile("rm_d1_mm >= d1_mm && rm_d1_mm < d1_mm + 2").unwrap();
        assert!(e.eval_bool(&b).unwrap());
        let e = Expr::compile("!(rm_d1_mm == 7) || d1_mm != 6").unwrap();
        assert!(!e.eval_bool(&b).unwrap());
    }

    #[test]
    fn test_unknown_operator_rejected_at_compile_time() {
        assert!(matches!(
            Expr::compile("a ^ b"),
            Err(DispatchError::FormulaError(_))
        ));
        assert!(Expr::compile("a = b").is_err());
        assert!(Expr::compile("(a + b").is_err());
        assert!(Expr::compile("a b").is_err());
        assert!(Expr::compile("").is_err());
    }

    #[test]
    fn test_unknown_variable_at_eval() {
        let e = Expr::compile("missing + 1").unwrap();
        assert!(matches!(
            e.eval(&Bindings::new()),
            Err(DispatchError::FormulaError(_))
        ));
    }

    #[test]
    fn test_compiled_template() {
        let mut t = RoutingTemplate::ratio("BT-1");
        t.rm_qty_formula = Some("fg_qty * oal_mm / rm_oal_mm".into());
        t.rm_rules = vec!["d1_mm > 5".into(), "d1_mm > 8".into()];
        let c = CompiledTemplate::compile(&t).unwrap();
        assert_eq!(c.calculated_qty(&bindings()).unwrap(), Some(2.5));
        assert_eq!(c.failing_rules(&bindings()).unwrap(), vec!["d1_mm > 8".to_string()]);
    }
}
