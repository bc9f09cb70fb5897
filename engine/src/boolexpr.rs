use crate::error::QueryError;

/// Boolean query AST. `NOT` is not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Atom(String),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    And,
    Or,
    Open,
    Close,
}

/// Parse a preprocessed boolean expression (tokens already whitespace
/// separated, parentheses spaced out). `AND` binds tighter than `OR`;
/// chains of one operator flatten into a single n-ary node.
pub fn parse(input: &str) -> Result<Expr, QueryError> {
    let tokens: Vec<Token> = input
        .split_whitespace()
        .map(|t| match t {
            "AND" => Token::And,
            "OR" => Token::Or,
            "(" => Token::Open,
            ")" => Token::Close,
            word => Token::Word(word.to_string()),
        })
        .collect();
    if tokens.is_empty() {
        return Err(QueryError::BadExpression("empty expression".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(QueryError::BadExpression(format!(
            "trailing input at token {}",
            parser.pos
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn or_expr(&mut self) -> Result<Expr, QueryError> {
        let mut operands = vec![self.and_expr()?];
        while matches!(self.peek(), Some(Token::Or)) {
            self.pos += 1;
            operands.push(self.and_expr()?);
        }
        Ok(collapse(operands, Expr::Or))
    }

    fn and_expr(&mut self) -> Result<Expr, QueryError> {
        let mut operands = vec![self.primary()?];
        while matches!(self.peek(), Some(Token::And)) {
            self.pos += 1;
            operands.push(self.primary()?);
        }
        Ok(collapse(operands, Expr::And))
    }

    fn primary(&mut self) -> Result<Expr, QueryError> {
        match self.advance() {
            Some(Token::Word(w)) => Ok(Expr::Atom(w)),
            Some(Token::Open) => {
                let inner = self.or_expr()?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(QueryError::BadExpression(
                        "unbalanced parentheses".into(),
                    )),
                }
            }
            other => Err(QueryError::BadExpression(format!(
                "expected a term, found {other:?}"
            ))),
        }
    }
}

fn collapse(mut operands: Vec<Expr>, build: fn(Vec<Expr>) -> Expr) -> Expr {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        build(operands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(s: &str) -> Expr {
        Expr::Atom(s.to_string())
    }

    #[test]
    fn single_word_is_atom() {
        assert_eq!(parse("apple").unwrap(), atom("apple"));
    }

    #[test]
    fn and_chain_flattens() {
        assert_eq!(
            parse("a AND b AND c").unwrap(),
            Expr::And(vec![atom("a"), atom("b"), atom("c")])
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert_eq!(
            parse("a AND b OR c AND d").unwrap(),
            Expr::Or(vec![
                Expr::And(vec![atom("a"), atom("b")]),
                Expr::And(vec![atom("c"), atom("d")]),
            ])
        );
    }

    #[test]
    fn parens_override_precedence() {
        assert_eq!(
            parse("a AND ( b OR c )").unwrap(),
            Expr::And(vec![atom("a"), Expr::Or(vec![atom("b"), atom("c")])])
        );
    }

    #[test]
    fn unbalanced_parens_fail() {
        assert!(parse("( a AND b").is_err());
        assert!(parse("a )").is_err());
    }

    #[test]
    fn dangling_operator_fails() {
        assert!(parse("a AND").is_err());
        assert!(parse("OR a").is_err());
    }

    #[test]
    fn adjacent_words_fail() {
        // free text is dispatched before boolean parsing; here it is an error
        assert!(parse("( a b )").is_err());
    }
}
