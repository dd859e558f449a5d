use std::iter::Peekable;
use std::vec::IntoIter;

use super::FormulaError;
use super::lexer::Token;
use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }

    fn binding_power(self) -> (u8, u8) {
        match self {
            BinaryOp::Add | BinaryOp::Sub => (1, 2),
            BinaryOp::Mul | BinaryOp::Div => (3, 4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

impl UnaryOp {
    pub fn symbol(self) -> char {
        match self {
            UnaryOp::Plus => '+',
            UnaryOp::Minus => '-',
        }
    }
}

const PREFIX_BINDING_POWER: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Var(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub(super) fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Var(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_variables(names),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            }
            Expr::Number(_) | Expr::Text(_) => {}
        }
    }
}

pub(super) fn parse(
    tokens: Vec<(Token, usize)>,
    config: &EngineConfig,
) -> Result<Expr, FormulaError> {
    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
        nodes: 0,
        max_nodes: config.max_formula_nodes,
        max_depth: config.max_formula_depth,
    };
    let (expr, _) = parser.expression(0, 0)?;
    match parser.tokens.next() {
        Some((token, position)) => Err(FormulaError::UnexpectedToken {
            found: token.to_string(),
            position,
        }),
        None => Ok(expr),
    }
}

struct Parser {
    tokens: Peekable<IntoIter<(Token, usize)>>,
    nodes: usize,
    max_nodes: usize,
    max_depth: usize,
}

impl Parser {
    /// Parses one operand chain starting at nesting level `depth`. Returns
    /// the expression with its height, so `depth + height` never exceeds
    /// the configured depth, left-associated chains included.
    fn expression(&mut self, min_power: u8, depth: usize) -> Result<(Expr, usize), FormulaError> {
        self.check_depth(depth)?;

        let (mut lhs, mut height) = match self.tokens.next() {
            Some((Token::Number(number), _)) => (Expr::Number(number), 0),
            Some((Token::Text(text), _)) => (Expr::Text(text), 0),
            Some((Token::Ident(name), _)) => (Expr::Var(name), 0),
            Some((Token::OpenParen, _)) => {
                let inner = self.expression(0, depth + 1)?;
                match self.tokens.next() {
                    Some((Token::CloseParen, _)) => inner,
                    Some((token, position)) => {
                        return Err(FormulaError::UnexpectedToken {
                            found: token.to_string(),
                            position,
                        });
                    }
                    None => return Err(FormulaError::UnexpectedEnd),
                }
            }
            Some((Token::Plus, _)) => self.prefix(UnaryOp::Plus, depth)?,
            Some((Token::Minus, _)) => self.prefix(UnaryOp::Minus, depth)?,
            Some((token, position)) => {
                return Err(FormulaError::UnexpectedToken {
                    found: token.to_string(),
                    position,
                });
            }
            None => return Err(FormulaError::UnexpectedEnd),
        };
        self.count_node()?;

        loop {
            let op = match self.tokens.peek() {
                Some((Token::Plus, _)) => BinaryOp::Add,
                Some((Token::Minus, _)) => BinaryOp::Sub,
                Some((Token::Star, _)) => BinaryOp::Mul,
                Some((Token::Slash, _)) => BinaryOp::Div,
                Some((Token::CloseParen, _)) | None => break,
                Some((token, position)) => {
                    return Err(FormulaError::UnexpectedToken {
                        found: token.to_string(),
                        position: *position,
                    });
                }
            };

            let (left_power, right_power) = op.binding_power();
            if left_power < min_power {
                break;
            }
            self.tokens.next();

            let (rhs, rhs_height) = self.expression(right_power, depth + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
            height = height.max(rhs_height) + 1;
            self.count_node()?;
            self.check_depth(depth + height)?;
        }

        Ok((lhs, height))
    }

    fn prefix(&mut self, op: UnaryOp, depth: usize) -> Result<(Expr, usize), FormulaError> {
        let (operand, height) = self.expression(PREFIX_BINDING_POWER, depth + 1)?;
        let expr = Expr::Unary {
            op,
            operand: Box::new(operand),
        };
        Ok((expr, height + 1))
    }

    fn check_depth(&self, level: usize) -> Result<(), FormulaError> {
        if level > self.max_depth {
            return Err(FormulaError::TooDeep {
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn count_node(&mut self) -> Result<(), FormulaError> {
        self.nodes += 1;
        if self.nodes > self.max_nodes {
            return Err(FormulaError::TooComplex {
                max: self.max_nodes,
            });
        }
        Ok(())
    }
}
