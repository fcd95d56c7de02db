use crate::error::{Error, ErrorKind};
use derive_more::Display;
use std::str::FromStr;

/// A format a book can be handed out in.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// FictionBook 2, the format every indexed book is stored in.
    #[default]
    #[display("fb2")]
    Fb2,
    #[display("epub")]
    Epub,
}
impl Format {
    pub const ALL: [Format; 2] = [Format::Fb2, Format::Epub];

    /// File extension (without the dot) that `ebook-convert` uses to pick
    /// the input or output format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Fb2 => "fb2",
            Self::Epub => "epub",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Fb2 => "application/x-fictionbook+xml",
            Self::Epub => "application/epub+zip",
        }
    }
}
impl FromStr for Format {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::from(ErrorKind::UnsupportedFormat(s.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("fb2", Format::Fb2)]
    #[case("FB2", Format::Fb2)]
    #[case(".epub", Format::Epub)]
    #[case(" epub ", Format::Epub)]
    fn test_parse(#[case] name: &str, #[case] expected: Format) {
        assert_eq!(name.parse::<Format>().unwrap(), expected);
    }

    #[rstest]
    #[case("pdf")]
    #[case("mobi")]
    #[case("")]
    fn test_parse_unsupported(#[case] name: &str) {
        let err = name.parse::<Format>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(n) if n == name));
    }

    #[test]
    fn test_display_matches_extension() {
        for format in Format::ALL {
            assert_eq!(format.to_string(), format.extension());
        }
    }
}
