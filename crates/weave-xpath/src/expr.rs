//! Path expression syntax
//!
//! Grammar (a strict subset of XPath):
//!
//! ```text
//! expr      := ("/" | "//")? step (("/" | "//") step)*
//! step      := name predicate*
//! name      := "*" | [A-Za-z_][A-Za-z0-9_.:-]*
//! predicate := "[" ( "@" name ( "=" quoted )? | integer | "first()" | "last()" ) "]"
//! ```
//!
//! An expression without a leading slash matches at any depth, exactly as if
//! it started with `//`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Parsed path expression
///
/// Compares and hashes by its source text.
#[derive(Debug, Clone)]
pub struct PathExpr {
    source: String,
    pub(crate) steps: Vec<Step>,
}

/// How a step reaches its candidates from the context node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    /// Direct children (`/`)
    Child,
    /// Children of the context node or any of its descendants (`//`)
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NameTest {
    Any,
    Name(String),
}

impl NameTest {
    pub(crate) fn accepts(&self, name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Name(n) => n == name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Predicate {
    AttrEquals { name: String, value: String },
    AttrExists(String),
    /// 1-based position
    Position(usize),
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Step {
    pub(crate) axis: Axis,
    pub(crate) test: NameTest,
    pub(crate) predicates: Vec<Predicate>,
}

impl PathExpr {
    /// Parse an expression
    ///
    /// # Errors
    /// Returns [`ExprError`] describing the first offending position.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let steps = Parser::new(source).parse()?;
        Ok(Self {
            source: source.to_string(),
            steps,
        })
    }

    /// Source text as written
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of location steps
    #[inline]
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

impl PartialEq for PathExpr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for PathExpr {}

impl std::hash::Hash for PathExpr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl Display for PathExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for PathExpr {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PathExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for PathExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError {
            expression: self.src.to_string(),
            position: self.pos,
            message: message.into(),
        }
    }

    fn parse(mut self) -> Result<Vec<Step>, ExprError> {
        self.skip_ws();
        if self.rest().is_empty() {
            return Err(self.error("empty expression"));
        }

        let mut steps = Vec::new();
        let mut axis = if self.eat("//") {
            Axis::Descendant
        } else if self.eat("/") {
            Axis::Child
        } else {
            Axis::Descendant
        };

        loop {
            steps.push(self.step(axis)?);
            self.skip_ws();
            if self.rest().is_empty() {
                return Ok(steps);
            }
            axis = if self.eat("//") {
                Axis::Descendant
            } else if self.eat("/") {
                Axis::Child
            } else {
                return Err(self.error("expected '/' or end of expression"));
            };
        }
    }

    fn step(&mut self, axis: Axis) -> Result<Step, ExprError> {
        self.skip_ws();
        let test = if self.eat("*") {
            NameTest::Any
        } else {
            NameTest::Name(self.name()?)
        };
        let mut predicates = Vec::new();
        loop {
            self.skip_ws();
            if !self.eat("[") {
                break;
            }
            self.skip_ws();
            predicates.push(self.predicate()?);
            self.skip_ws();
            if !self.eat("]") {
                return Err(self.error("expected ']'"));
            }
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn name(&mut self) -> Result<String, ExprError> {
        let rest = self.rest();
        let mut end = 0;
        for (i, c) in rest.char_indices() {
            let ok = if i == 0 {
                c.is_alphabetic() || c == '_'
            } else {
                c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
            };
            if !ok {
                break;
            }
            end = i + c.len_utf8();
        }
        if end == 0 {
            return Err(self.error("expected a tag or attribute name"));
        }
        self.pos += end;
        Ok(rest[..end].to_string())
    }

    fn predicate(&mut self) -> Result<Predicate, ExprError> {
        if self.eat("@") {
            let name = self.name()?;
            self.skip_ws();
            if !self.eat("=") {
                return Ok(Predicate::AttrExists(name));
            }
            self.skip_ws();
            let value = self.quoted()?;
            return Ok(Predicate::AttrEquals { name, value });
        }
        if self.eat("last()") {
            return Ok(Predicate::Last);
        }
        if self.eat("first()") {
            return Ok(Predicate::Position(1));
        }
        let digits: String = self.rest().chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(self.error("expected '@name', a position, 'first()' or 'last()'"));
        }
        let position: usize = digits
            .parse()
            .map_err(|_| self.error("position out of range"))?;
        if position == 0 {
            return Err(self.error("positions are 1-based"));
        }
        self.pos += digits.len();
        Ok(Predicate::Position(position))
    }

    fn quoted(&mut self) -> Result<String, ExprError> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected quoted value")),
        };
        self.pos += 1;
        let rest = self.rest();
        let end = rest
            .find(quote)
            .ok_or_else(|| self.error("unterminated string"))?;
        let value = rest[..end].to_string();
        self.pos += end + 1;
        Ok(value)
    }
}

/// Malformed path expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid expression '{expression}' at {position}: {message}")]
pub struct ExprError {
    /// Full expression text
    pub expression: String,
    /// Byte offset of the problem
    pub position: usize,
    /// What was expected
    pub message: String,
}
