use super::Author;

/// Bibliographic metadata of a single FictionBook document.
///
/// Every field defaults to empty: a document omitting an element is not an
/// error, it just leaves the field blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metadata {
    pub title: String,
    pub author: Author,
    /// Plain text of the annotation, one line per paragraph.
    pub annotation: String,
    pub genre: String,
    /// Publication date, kept as free text (FB2 dates are often just a year).
    pub date: String,
    /// Language tag, e.g. `en` or `ru`.
    pub language: String,
    pub has_cover: bool,
}
