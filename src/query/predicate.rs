//! Predicate tree for the listing site's search expression language.
//!
//! The site embeds search filters as a prefix expression such as
//!
//! ```text
//! (And.Hidden.N._.(C.CarType.Y._.(C.Manufacturer.기아._.Model.K5.)))
//! ```
//!
//! A term is `<Field>.<value>.`, siblings are separated by `_.`, a category
//! `(C.<Field>.<value>._.<refinement>)` narrows its parent, and `(And. .. )`
//! groups conjunctive terms. Inside a value `.` and `)` are escaped as `_.`
//! and `_)`. The site also knows `(Or. .. )` groups; they have no
//! representation here and are rejected when parsing.

use std::fmt;
use std::str::FromStr;

use crate::error::{QueryError, Result};

/// Deepest group nesting accepted by the parser. Site expressions nest one
/// level per model-chain field.
pub const MAX_NESTING: usize = 32;

/// Field names understood by the search expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Hidden,
    Options,
    CarType,
    Manufacturer,
    ModelGroup,
    Model,
    BadgeGroup,
    Badge,
    BadgeDetail,
}

impl Field {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hidden => "Hidden",
            Self::Options => "Options",
            Self::CarType => "CarType",
            Self::Manufacturer => "Manufacturer",
            Self::ModelGroup => "ModelGroup",
            Self::Model => "Model",
            Self::BadgeGroup => "BadgeGroup",
            Self::Badge => "Badge",
            Self::BadgeDetail => "BadgeDetail",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = QueryError;

    fn from_str(name: &str) -> Result<Self> {
        let field = match name {
            "Hidden" => Self::Hidden,
            "Options" => Self::Options,
            "CarType" => Self::CarType,
            "Manufacturer" => Self::Manufacturer,
            "ModelGroup" => Self::ModelGroup,
            "Model" => Self::Model,
            "BadgeGroup" => Self::BadgeGroup,
            "Badge" => Self::Badge,
            "BadgeDetail" => Self::BadgeDetail,
            other => return Err(QueryError::UnknownField(other.to_string())),
        };
        Ok(field)
    }
}

/// A conjunctive search expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Category {
        field: Field,
        value: String,
        refine: Box<Predicate>,
    },
    Term {
        field: Field,
        value: String,
    },
}

impl Predicate {
    pub fn term(field: Field, value: impl Into<String>) -> Self {
        Self::Term {
            field,
            value: value.into(),
        }
    }

    pub fn category(field: Field, value: impl Into<String>, refine: Self) -> Self {
        Self::Category {
            field,
            value: value.into(),
            refine: Box::new(refine),
        }
    }

    /// Parses an expression produced by the site or by [`Predicate`]'s
    /// `Display` implementation.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser {
            input,
            pos: 0,
            depth: 0,
        };
        let node = parser.node()?;
        if parser.pos != input.len() {
            return Err(parser.error("trailing input after expression"));
        }
        Ok(node)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term { field, value } => write!(f, "{field}.{}.", Escaped(value)),
            Self::Category {
                field,
                value,
                refine,
            } => write!(f, "(C.{field}.{}._.{refine})", Escaped(value)),
            Self::And(children) => {
                f.write_str("(And.")?;
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        f.write_str("_.")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            if matches!(c, '.' | ')') {
                f.write_str("_")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{token}`")))
        }
    }

    fn error(&self, reason: impl Into<String>) -> QueryError {
        QueryError::Syntax {
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn node(&mut self) -> Result<Predicate> {
        if !self.rest().starts_with('(') {
            let (field, value) = self.pair()?;
            return Ok(Predicate::Term { field, value });
        }

        if self.depth == MAX_NESTING {
            return Err(self.error(format!("groups nested deeper than {MAX_NESTING} levels")));
        }
        self.depth += 1;
        let group = self.group();
        self.depth -= 1;
        group
    }

    fn group(&mut self) -> Result<Predicate> {
        if self.eat("(And.") {
            let children = self.sequence()?;
            self.expect(")")?;
            return Ok(Predicate::And(children));
        }

        if self.eat("(Or.") {
            let alternatives = self.sequence()?;
            let field = match alternatives.first() {
                Some(Predicate::Term { field, .. } | Predicate::Category { field, .. }) => {
                    field.as_str()
                }
                _ => "expression",
            };
            return Err(QueryError::UnsupportedAlternation {
                field,
                count: alternatives.len(),
            });
        }

        if self.eat("(C.") {
            let (field, value) = self.pair()?;
            self.expect("_.")?;
            let refine = self.node()?;
            self.expect(")")?;
            return Ok(Predicate::category(field, value, refine));
        }

        Err(self.error("unknown group"))
    }

    fn sequence(&mut self) -> Result<Vec<Predicate>> {
        let mut nodes = vec![self.node()?];
        while self.eat("_.") {
            nodes.push(self.node()?);
        }
        Ok(nodes)
    }

    fn pair(&mut self) -> Result<(Field, String)> {
        let rest = self.rest();
        let name_end = rest
            .find('.')
            .ok_or_else(|| self.error("unterminated field name"))?;
        let field = rest[..name_end].parse::<Field>()?;
        self.pos += name_end + 1;

        let start = self.pos;
        let mut value = String::new();
        let mut chars = self.rest().char_indices().peekable();
        while let Some((offset, c)) = chars.next() {
            match c {
                '_' if matches!(chars.peek(), Some((_, '.' | ')'))) => {
                    if let Some((_, escaped)) = chars.next() {
                        value.push(escaped);
                    }
                }
                '.' => {
                    self.pos = start + offset + 1;
                    return Ok((field, value));
                }
                _ => value.push(c),
            }
        }

        Err(self.error(format!("unterminated value for {field}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_nested_categories() {
        let predicate = Predicate::And(vec![
            Predicate::term(Field::Hidden, "N"),
            Predicate::category(
                Field::CarType,
                "Y",
                Predicate::category(
                    Field::Manufacturer,
                    "기아",
                    Predicate::term(Field::Model, "K5"),
                ),
            ),
        ]);

        assert_eq!(
            predicate.to_string(),
            "(And.Hidden.N._.(C.CarType.Y._.(C.Manufacturer.기아._.Model.K5.)))"
        );
    }

    #[test]
    fn escapes_dots_and_closing_parens_in_values() {
        assert_eq!(
            Predicate::term(Field::Badge, "2.0 터보 2WD").to_string(),
            "Badge.2_.0 터보 2WD."
        );
        assert_eq!(
            Predicate::term(Field::Options, "크루즈 컨트롤(어댑티브)").to_string(),
            "Options.크루즈 컨트롤(어댑티브_)."
        );
    }

    #[test]
    fn parses_site_expression_with_options() {
        let action = "(And.Hidden.N._.Options.크루즈 컨트롤(어댑티브_)._.Options.360도 어라운드 뷰._.(C.CarType.Y._.(C.Manufacturer.기아._.(C.ModelGroup.스팅어._.(C.Model.스팅어._.BadgeGroup.가솔린 2000cc.)))))";
        let predicate = Predicate::parse(action).expect("parse");

        let Predicate::And(children) = &predicate else {
            panic!("expected And root, got {predicate:?}");
        };
        assert_eq!(children.len(), 4);
        assert_eq!(
            children[1],
            Predicate::term(Field::Options, "크루즈 컨트롤(어댑티브)")
        );
        assert_eq!(predicate.to_string(), action);
    }

    #[test]
    fn parses_escaped_decimal() {
        let predicate =
            Predicate::parse("(C.BadgeGroup.가솔린 2000cc._.Badge.2_.0 터보 2WD.)").expect("parse");
        assert_eq!(
            predicate,
            Predicate::category(
                Field::BadgeGroup,
                "가솔린 2000cc",
                Predicate::term(Field::Badge, "2.0 터보 2WD"),
            )
        );
    }

    #[test]
    fn rejects_alternation_groups() {
        let err = Predicate::parse(
            "(C.Badge.2_.0 터보 2WD._.(Or.BadgeDetail.플래티넘._.BadgeDetail.드림에디션.))",
        )
        .unwrap_err();

        assert!(matches!(
            err,
            QueryError::UnsupportedAlternation {
                field: "BadgeDetail",
                count: 2
            }
        ));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let deep = |levels: usize| {
            format!(
                "{}Model.K5.{}",
                "(C.Manufacturer.기아._.".repeat(levels),
                ")".repeat(levels)
            )
        };

        assert!(Predicate::parse(&deep(MAX_NESTING)).is_ok());
        assert!(matches!(
            Predicate::parse(&deep(MAX_NESTING + 1)),
            Err(QueryError::Syntax { .. })
        ));
        assert!(matches!(
            Predicate::parse(&deep(100_000)),
            Err(QueryError::Syntax { .. })
        ));
    }

    #[test]
    fn rejects_unbalanced_and_unknown_input() {
        assert!(matches!(
            Predicate::parse("(And.Hidden.N."),
            Err(QueryError::Syntax { .. })
        ));
        assert!(matches!(
            Predicate::parse("(And.Hidden.N.))"),
            Err(QueryError::Syntax { .. })
        ));
        assert!(matches!(
            Predicate::parse("(And.Color.Red.)"),
            Err(QueryError::UnknownField(name)) if name == "Color"
        ));
    }
}
