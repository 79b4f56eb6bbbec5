//! Recursive-descent parser over the restricted condition grammar.
//!
//! Grammar (loosely, in precedence order):
//!   ternary   := or_expr ( "if" or_expr "else" ternary )?
//!   or_expr   := and_expr ( "or" and_expr )*
//!   and_expr  := not_expr ( "and" not_expr )*
//!   not_expr  := "not" not_expr | compare
//!   compare   := postfix ( compare_op postfix )*
//!   postfix   := atom ( "." IDENT | "(" args ")" | "[" expr "]" )*
//!   atom      := NUMBER | STRING | True | False | None | IDENT | "(" expr ")" | "[" expr,* "]"

use super::ast::{BoolOp, CompareOp, Expr, Literal};
use super::lexer::{tokenize, ParseError, Token};

pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_ternary()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => Err(ParseError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let body = self.parse_or()?;
        if matches!(self.peek(), Token::If) {
            self.advance();
            let test = self.parse_or()?;
            match self.advance() {
                Token::Else => {}
                other => return Err(ParseError::UnexpectedToken(format!("{other:?}"))),
            }
            let orelse = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut values = vec![self.parse_and()?];
        while matches!(self.peek(), Token::Or) {
            self.advance();
            values.push(self.parse_and()?);
        }
        if values.len() == 1 {
            Ok(values.pop().unwrap())
        } else {
            Ok(Expr::BoolOp(BoolOp::Or, values))
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut values = vec![self.parse_not()?];
        while matches!(self.peek(), Token::And) {
            self.advance();
            values.push(self.parse_not()?);
        }
        if values.len() == 1 {
            Ok(values.pop().unwrap())
        } else {
            Ok(Expr::BoolOp(BoolOp::And, values))
        }
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek(), Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_postfix()?;
        let mut rest = Vec::new();

        loop {
            let op = match self.peek() {
                Token::Gt => CompareOp::Gt,
                Token::Lt => CompareOp::Lt,
                Token::Ge => CompareOp::Ge,
                Token::Le => CompareOp::Le,
                Token::Eq => CompareOp::Eq,
                Token::Ne => CompareOp::Ne,
                Token::In => CompareOp::In,
                Token::Not => {
                    // lookahead for "not in"
                    let save = self.pos;
                    self.advance();
                    if matches!(self.peek(), Token::In) {
                        self.advance();
                        let rhs = self.parse_postfix()?;
                        rest.push((CompareOp::NotIn, rhs));
                        continue;
                    }
                    self.pos = save;
                    break;
                }
                _ => break,
            };
            self.advance();
            let rhs = self.parse_postfix()?;
            rest.push((op, rhs));
        }

        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), rest))
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = match self.advance() {
                        Token::Ident(n) => n,
                        other => return Err(ParseError::UnexpectedToken(format!("{other:?}"))),
                    };
                    if matches!(self.peek(), Token::LParen) {
                        self.advance();
                        let args = self.parse_args()?;
                        expr = Expr::MethodCall {
                            receiver: Box::new(expr),
                            method: name,
                            args,
                        };
                    } else {
                        expr = Expr::Attribute(Box::new(expr), name);
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_ternary()?;
                    match self.advance() {
                        Token::RBracket => {}
                        other => return Err(ParseError::UnexpectedToken(format!("{other:?}"))),
                    }
                    expr = Expr::Subscript(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Token::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_ternary()?);
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                Token::RParen => {
                    self.advance();
                    break;
                }
                other => return Err(ParseError::UnexpectedToken(format!("{other:?}"))),
            }
        }
        Ok(args)
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Literal(Literal::Num(n))),
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::True => Ok(Expr::Literal(Literal::Bool(true))),
            Token::False => Ok(Expr::Literal(Literal::Bool(false))),
            Token::None => Ok(Expr::Literal(Literal::None)),
            Token::Ident(name) => {
                if matches!(self.peek(), Token::LParen) {
                    self.advance();
                    let args = self.parse_args()?;
                    Ok(Expr::Call { func: name, args })
                } else {
                    Ok(Expr::Name(name))
                }
            }
            Token::LParen => {
                let inner = self.parse_ternary()?;
                match self.advance() {
                    Token::RParen => Ok(inner),
                    other => Err(ParseError::UnexpectedToken(format!("{other:?}"))),
                }
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if matches!(self.peek(), Token::RBracket) {
                    self.advance();
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.parse_ternary()?);
                    match self.advance() {
                        Token::Comma => {}
                        Token::RBracket => break,
                        other => return Err(ParseError::UnexpectedToken(format!("{other:?}"))),
                    }
                }
                Ok(Expr::List(items))
            }
            Token::Eof => Err(ParseError::UnexpectedEof("expression")),
            other => Err(ParseError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_comparison() {
        let expr = parse("estimated_cost > 0.5").unwrap();
        assert!(matches!(expr, Expr::Compare(_, _)));
    }

    #[test]
    fn parses_and_or_precedence() {
        // "and" binds tighter than "or"
        let expr = parse("a == 1 or b == 2 and c == 3").unwrap();
        match expr {
            Expr::BoolOp(BoolOp::Or, values) => {
                assert_eq!(values.len(), 2);
                assert!(matches!(values[1], Expr::BoolOp(BoolOp::And, _)));
            }
            other => panic!("expected top-level Or, got {other:?}"),
        }
    }

    #[test]
    fn parses_attribute_and_call_chain() {
        let expr = parse("parameters.path.startswith(\"/etc\")").unwrap();
        assert!(matches!(expr, Expr::MethodCall { .. }));
    }

    #[test]
    fn parses_membership_and_negated_membership() {
        assert!(matches!(parse("x in [1, 2, 3]").unwrap(), Expr::Compare(_, _)));
        let expr = parse("x not in [1, 2, 3]").unwrap();
        match expr {
            Expr::Compare(_, rest) => assert_eq!(rest[0].0, CompareOp::NotIn),
            other => panic!("expected Compare, got {other:?}"),
        }
    }

    #[test]
    fn parses_ternary() {
        assert!(matches!(
            parse("1 if risk_level == \"HIGH\" else 0").unwrap(),
            Expr::Ternary { .. }
        ));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("a == 1 )").is_err());
    }
}
