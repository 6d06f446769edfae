// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * Parsing for simple arithmetic over measurement-set columns, e.g.
 * `out.ms::CORRECTED_DATA = out.ms::DATA - out.ms::MODEL_DATA`.
 */

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// One operand of an equation: `table-path::COLUMN`. Column names are
/// upper-cased, like casacore writes them.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: PathBuf,
    pub column: String,
}

impl FromStr for ColumnRef {
    type Err = AbacusError;

    fn from_str(s: &str) -> Result<ColumnRef, AbacusError> {
        let fields: Vec<&str> = s.split("::").collect();
        match fields.as_slice() {
            [table, column] if !table.is_empty() && !column.is_empty() => Ok(ColumnRef {
                table: PathBuf::from(table),
                column: column.to_uppercase(),
            }),
            _ => Err(AbacusError::BadColumnRef(s.to_string())),
        }
    }
}

/// A parsed column equation.
#[derive(Debug, PartialEq)]
pub enum Expr {
    /// `dest = src`
    Copy { dest: ColumnRef, src: ColumnRef },
    /// `dest = a + b`
    Add {
        dest: ColumnRef,
        a: ColumnRef,
        b: ColumnRef,
    },
    /// `dest = a - b`
    Sub {
        dest: ColumnRef,
        a: ColumnRef,
        b: ColumnRef,
    },
}

impl Expr {
    /// Parse an equation's whitespace-split tokens. Only the 3-token (copy)
    /// and 5-token (add/subtract) forms exist.
    pub fn parse(tokens: &[String]) -> Result<Expr, AbacusError> {
        match tokens {
            [dest, eq, src] => {
                expect_equals(eq)?;
                Ok(Expr::Copy {
                    dest: dest.parse()?,
                    src: src.parse()?,
                })
            }
            [dest, eq, a, op, b] => {
                expect_equals(eq)?;
                let dest = dest.parse()?;
                let a = a.parse()?;
                let b = b.parse()?;
                match op.as_str() {
                    "+" => Ok(Expr::Add { dest, a, b }),
                    "-" => Ok(Expr::Sub { dest, a, b }),
                    _ => Err(AbacusError::UnknownOperator(op.to_string())),
                }
            }
            _ => Err(AbacusError::BadArity(tokens.len())),
        }
    }

    pub fn dest(&self) -> &ColumnRef {
        match self {
            Expr::Copy { dest, .. } | Expr::Add { dest, .. } | Expr::Sub { dest, .. } => dest,
        }
    }

    pub fn sources(&self) -> Vec<&ColumnRef> {
        match self {
            Expr::Copy { src, .. } => vec![src],
            Expr::Add { a, b, .. } | Expr::Sub { a, b, .. } => vec![a, b],
        }
    }
}

fn expect_equals(token: &str) -> Result<(), AbacusError> {
    if token == "=" {
        Ok(())
    } else {
        Err(AbacusError::MissingEquals(token.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum AbacusError {
    #[error("Expected 3 or 5 tokens in the equation, got {0}")]
    BadArity(usize),

    #[error("Expected '=' as the second token of the equation, got '{0}'")]
    MissingEquals(String),

    #[error("Unknown operator '{0}'; only + and - are supported")]
    UnknownOperator(String),

    #[error("'{0}' isn't of the form table.ms::COLUMN")]
    BadColumnRef(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<String> {
        s.split_whitespace().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_parse_copy() {
        let expr = Expr::parse(&tokens("a.ms::CORRECTED_DATA = b.ms::data")).unwrap();
        match &expr {
            Expr::Copy { dest, src } => {
                assert_eq!(dest.table, PathBuf::from("a.ms"));
                assert_eq!(dest.column, "CORRECTED_DATA");
                // Column names are upper-cased.
                assert_eq!(src.column, "DATA");
            }
            _ => panic!("Expected Copy, got {:?}", expr),
        }
        assert_eq!(expr.sources().len(), 1);
    }

    #[test]
    fn test_parse_add_and_sub() {
        let expr = Expr::parse(&tokens("a.ms::DATA = b.ms::DATA + c.ms::DATA")).unwrap();
        assert!(matches!(expr, Expr::Add { .. }));
        assert_eq!(expr.dest().table, PathBuf::from("a.ms"));
        assert_eq!(expr.sources().len(), 2);

        let expr = Expr::parse(&tokens("a.ms::DATA = b.ms::DATA - c.ms::MODEL_DATA")).unwrap();
        match &expr {
            Expr::Sub { b, .. } => assert_eq!(b.column, "MODEL_DATA"),
            _ => panic!("Expected Sub, got {:?}", expr),
        }
    }

    #[test]
    fn test_parse_rejects_bad_arity() {
        assert!(matches!(
            Expr::parse(&tokens("a.ms::DATA =")),
            Err(AbacusError::BadArity(2))
        ));
        assert!(matches!(
            Expr::parse(&tokens("a.ms::DATA = b.ms::DATA + c.ms::DATA + d.ms::DATA")),
            Err(AbacusError::BadArity(7))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_tokens() {
        assert!(matches!(
            Expr::parse(&tokens("a.ms::DATA == b.ms::DATA")),
            Err(AbacusError::MissingEquals(_))
        ));
        assert!(matches!(
            Expr::parse(&tokens("a.ms::DATA = b.ms::DATA * c.ms::DATA")),
            Err(AbacusError::UnknownOperator(_))
        ));
        assert!(matches!(
            Expr::parse(&tokens("a.ms::DATA = nonsense")),
            Err(AbacusError::BadColumnRef(_))
        ));
        assert!(matches!(
            "DATA".parse::<ColumnRef>(),
            Err(AbacusError::BadColumnRef(_))
        ));
    }
}
