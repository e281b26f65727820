//! Paths into nested schemas and values

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a [`SchemaPath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// Named object property
    Property(String),
    /// Concrete array position
    Index(usize),
    /// Any array element (schema-level)
    Items,
}

/// Location of a sub-schema or sub-value, rendered as `a.b[0].c` or `a.b[].c`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaPath(Vec<PathSegment>);

impl SchemaPath {
    /// The empty path
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Extend with a property name
    pub fn property(&self, name: impl Into<String>) -> Self {
        self.child(PathSegment::Property(name.into()))
    }

    /// Extend with an array position
    pub fn index(&self, i: usize) -> Self {
        self.child(PathSegment::Index(i))
    }

    /// Extend with the array-element marker
    pub fn items(&self) -> Self {
        self.child(PathSegment::Items)
    }

    fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the dotted form produced by `Display`.
    ///
    /// Returns `None` for an empty string or a malformed bracket.
    pub fn parse(dotted: &str) -> Option<Self> {
        if dotted.is_empty() {
            return None;
        }
        let mut segments = Vec::new();
        for part in dotted.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if name.is_empty() && segments.is_empty() && rest.is_empty() {
                return None;
            }
            if !name.is_empty() {
                segments.push(PathSegment::Property(name.to_string()));
            }
            while !rest.is_empty() {
                let close = rest.find(']')?;
                let inner = &rest[1..close];
                if inner.is_empty() {
                    segments.push(PathSegment::Items);
                } else {
                    segments.push(PathSegment::Index(inner.parse().ok()?));
                }
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return None;
                }
            }
        }
        Some(Self(segments))
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(root)");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Property(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
                PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
                PathSegment::Items => write!(f, "[]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let path = SchemaPath::root().property("X").items().property("y").index(2);
        assert_eq!(path.to_string(), "X[].y[2]");
        assert_eq!(SchemaPath::root().to_string(), "(root)");
    }

    #[test]
    fn test_parse_roundtrip() {
        for text in ["Scale.method", "choice.LR.C", "w[0]", "a[].b[3]"] {
            let path = SchemaPath::parse(text).unwrap();
            assert_eq!(path.to_string(), text);
        }
        assert!(SchemaPath::parse("").is_none());
        assert!(SchemaPath::parse("a[x]").is_none());
    }
}
