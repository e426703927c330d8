use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One step of a callback path: an object field name or a sequence index.
///
/// The wire form of an index is a decimal string (the dialect has always
/// emitted stringified indices), but integers are accepted on decode. An
/// index step and the numeric-string key it would shadow are told apart by
/// the kind of the value being walked, not by the segment itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSeg {
    Index(usize),
    Key(String),
}

impl PathSeg {
    pub fn key(name: impl Into<String>) -> Self {
        PathSeg::Key(name.into())
    }

    pub fn index(i: usize) -> Self {
        PathSeg::Index(i)
    }

    /// Interpret this segment as a sequence index, accepting numeric
    /// strings.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSeg::Index(i) => Some(*i),
            PathSeg::Key(k) => k.parse().ok(),
        }
    }

    /// Interpret this segment as an object key.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            PathSeg::Index(i) => Cow::Owned(i.to_string()),
            PathSeg::Key(k) => Cow::Borrowed(k),
        }
    }
}

impl fmt::Display for PathSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSeg::Index(i) => write!(f, "{i}"),
            PathSeg::Key(k) => f.write_str(k),
        }
    }
}

impl Serialize for PathSeg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PathSeg::Index(i) => serializer.serialize_str(&i.to_string()),
            PathSeg::Key(k) => serializer.serialize_str(k),
        }
    }
}

impl<'de> Deserialize<'de> for PathSeg {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Str(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(i) => PathSeg::Index(i as usize),
            Raw::Str(s) => PathSeg::Key(s),
        })
    }
}

impl From<usize> for PathSeg {
    fn from(i: usize) -> Self {
        PathSeg::Index(i)
    }
}

impl From<&str> for PathSeg {
    fn from(s: &str) -> Self {
        PathSeg::Key(s.to_string())
    }
}

impl From<String> for PathSeg {
    fn from(s: String) -> Self {
        PathSeg::Key(s)
    }
}

/// An ordered walk from the root of an argument tree to one position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathSeg>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn from_segs(segs: Vec<PathSeg>) -> Self {
        Path(segs)
    }

    pub fn push(&mut self, seg: PathSeg) {
        self.0.push(seg);
    }

    pub fn pop(&mut self) -> Option<PathSeg> {
        self.0.pop()
    }

    pub fn segs(&self) -> &[PathSeg] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Split off the leading segment, yielding it and the remainder.
    pub fn split_first(&self) -> Option<(&PathSeg, Path)> {
        let (first, rest) = self.0.split_first()?;
        Some((first, Path(rest.to_vec())))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl FromIterator<PathSeg> for Path {
    fn from_iter<I: IntoIterator<Item = PathSeg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl From<Vec<PathSeg>> for Path {
    fn from(segs: Vec<PathSeg>) -> Self {
        Path(segs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_is_stringified() {
        let path = Path::from_segs(vec![PathSeg::index(0), PathSeg::key("callbacks")]);
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"["0","callbacks"]"#);
    }

    #[test]
    fn decode_accepts_integers_and_strings() {
        let path: Path = serde_json::from_str(r#"[0, "1", "name"]"#).unwrap();
        assert_eq!(path.segs()[0].as_index(), Some(0));
        assert_eq!(path.segs()[1].as_index(), Some(1));
        assert_eq!(path.segs()[2].as_key(), "name");
        assert_eq!(path.segs()[2].as_index(), None);
    }
}
