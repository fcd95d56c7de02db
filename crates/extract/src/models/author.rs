use std::fmt::{Display, Formatter, Result as FmtResult};

/// The (first) author credited in a document's title info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Author {
    pub first_name: String,
    pub last_name: String,
}
impl Author {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self { first_name: first_name.into(), last_name: last_name.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_empty() && self.last_name.is_empty()
    }
}

impl<F: Into<String>, L: Into<String>> From<(F, L)> for Author {
    fn from((first_name, last_name): (F, L)) -> Self {
        Self::new(first_name, last_name)
    }
}

impl Display for Author {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => write!(f, "{} {}", self.first_name, self.last_name),
            (true, false) => write!(f, "{}", self.last_name),
            (false, true) => write!(f, "{}", self.first_name),
            (true, true) => write!(f, "Unknown"),
        }
    }
}
