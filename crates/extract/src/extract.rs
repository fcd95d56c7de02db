//! Streaming FictionBook parser.

use std::io::BufRead;

use exn::ResultExt;
use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use tracing::instrument;

use crate::consts;
use crate::error::{ErrorKind, Result};
use crate::models::{Author, Metadata};

/// The metadata fields we capture from element text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    FirstName,
    LastName,
    Annotation,
    Genre,
    Date,
    Language,
}
impl Field {
    /// Which field (if any) an element populates, given its parent element.
    fn matching(name: &[u8], parent: Option<&[u8]>) -> Option<Self> {
        match name {
            consts::BOOK_TITLE => Some(Self::Title),
            consts::FIRST_NAME if parent == Some(consts::AUTHOR) => Some(Self::FirstName),
            consts::LAST_NAME if parent == Some(consts::AUTHOR) => Some(Self::LastName),
            consts::ANNOTATION => Some(Self::Annotation),
            consts::GENRE => Some(Self::Genre),
            consts::DATE => Some(Self::Date),
            consts::LANG => Some(Self::Language),
            _ => None,
        }
    }
}

/// First-match-wins storage for the captured fields.
#[derive(Debug, Default)]
struct Fields {
    title: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    annotation: Option<String>,
    genre: Option<String>,
    date: Option<String>,
    language: Option<String>,
    has_cover: bool,
}
impl Fields {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Title => &mut self.title,
            Field::FirstName => &mut self.first_name,
            Field::LastName => &mut self.last_name,
            Field::Annotation => &mut self.annotation,
            Field::Genre => &mut self.genre,
            Field::Date => &mut self.date,
            Field::Language => &mut self.language,
        }
    }

    fn is_unset(&mut self, field: Field) -> bool {
        self.slot(field).is_none()
    }

    fn set(&mut self, field: Field, value: String) {
        let slot = self.slot(field);
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    fn into_metadata(self) -> Metadata {
        Metadata {
            title: self.title.unwrap_or_default(),
            author: Author::new(self.first_name.unwrap_or_default(), self.last_name.unwrap_or_default()),
            annotation: self.annotation.unwrap_or_default(),
            genre: self.genre.unwrap_or_default(),
            date: self.date.unwrap_or_default(),
            language: self.language.unwrap_or_default(),
            has_cover: self.has_cover,
        }
    }
}

/// Text collected for a field between its start and end tags.
#[derive(Debug)]
struct Capture {
    field: Field,
    /// Depth of the captured element (length of the element stack before it
    /// was pushed).
    depth: usize,
    lines: Vec<String>,
    /// Used when the element has no text at all (`<date value="1998"/>`).
    fallback: Option<String>,
}
impl Capture {
    fn new(field: Field, depth: usize, fallback: Option<String>) -> Self {
        Self { field, depth, lines: vec![String::new()], fallback }
    }

    /// Annotations are made of paragraphs; each direct child starts a new line.
    fn child_opened(&mut self, depth: usize) {
        if self.field == Field::Annotation && depth == self.depth + 1 {
            self.lines.push(String::new());
        }
    }

    fn push(&mut self, text: &str) {
        // There is always at least one line.
        if let Some(line) = self.lines.last_mut() {
            line.push_str(text);
        }
    }

    /// Whitespace runs inside a line collapse to a single space.
    fn finish(self) -> String {
        let text = self
            .lines
            .iter()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        match (text.is_empty(), self.fallback) {
            (true, Some(fallback)) => fallback,
            _ => text,
        }
    }
}

/// Streaming metadata extractor for FictionBook 2 documents.
///
/// Reads the document incrementally with a small reusable buffer; memory use
/// is bounded by the largest single event (tag or text node), never by the
/// size of the document.
#[derive(Debug)]
pub struct Extractor<R> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}
impl<R: BufRead> Extractor<R> {
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = true;
        config.check_comments = true;
        Self { reader, buffer: Vec::with_capacity(1024) }
    }

    /// Walks the entire document and returns the first occurrence of every
    /// metadata element.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Malformed`] if the document is not well-formed XML,
    /// - [`ErrorKind::InvalidDocument`] if the root element isn't `FictionBook`,
    /// - [`ErrorKind::Io`] if the stream fails.
    #[instrument(skip(self))]
    pub fn metadata(mut self) -> Result<Metadata> {
        let mut fields = Fields::default();
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut capture: Option<Capture> = None;
        let mut seen_root = false;
        loop {
            let event = match self.reader.read_event_into(&mut self.buffer) {
                Ok(event) => event,
                Err(err) => {
                    let kind = match &err {
                        quick_xml::Error::Io(_) => ErrorKind::Io,
                        other => ErrorKind::Malformed(other.to_string()),
                    };
                    return Err(err).or_raise(|| kind);
                },
            };
            match event {
                Event::Start(start) => {
                    let name = start.local_name().as_ref().to_vec();
                    check_root(&name, &stack, &mut seen_root)?;
                    let parent = stack.last().map(Vec::as_slice);
                    inspect_cover(&start, &name, parent, &mut fields)?;
                    match capture.as_mut() {
                        Some(capture) => capture.child_opened(stack.len()),
                        None => {
                            if let Some(field) = Field::matching(&name, parent)
                                && fields.is_unset(field)
                            {
                                let fallback = date_fallback(&start, field, self.reader.decoder())?;
                                capture = Some(Capture::new(field, stack.len(), fallback));
                            }
                        },
                    }
                    stack.push(name);
                },
                Event::Empty(start) => {
                    let name = start.local_name().as_ref().to_vec();
                    check_root(&name, &stack, &mut seen_root)?;
                    let parent = stack.last().map(Vec::as_slice);
                    inspect_cover(&start, &name, parent, &mut fields)?;
                    if capture.is_none()
                        && let Some(field) = Field::matching(&name, parent)
                    {
                        let value = date_fallback(&start, field, self.reader.decoder())?.unwrap_or_default();
                        fields.set(field, value);
                    }
                },
                Event::End(_) => {
                    stack.pop();
                    if capture.as_ref().is_some_and(|c| c.depth == stack.len())
                        && let Some(finished) = capture.take()
                    {
                        let field = finished.field;
                        fields.set(field, finished.finish());
                    }
                },
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .or_raise(|| ErrorKind::Malformed("invalid character or entity reference".to_string()))?;
                    if stack.is_empty() && !text.trim().is_empty() {
                        exn::bail!(ErrorKind::Malformed("text outside of the root element".to_string()));
                    }
                    if let Some(capture) = capture.as_mut() {
                        capture.push(&text);
                    }
                },
                Event::CData(data) => {
                    if let Some(capture) = capture.as_mut() {
                        let text = self
                            .reader
                            .decoder()
                            .decode(&data)
                            .or_raise(|| ErrorKind::Malformed("undecodable character data".to_string()))?;
                        capture.push(&text);
                    }
                },
                Event::Eof => {
                    if !stack.is_empty() {
                        exn::bail!(ErrorKind::Malformed(format!(
                            "unexpected end of document, {} element(s) left open",
                            stack.len()
                        )));
                    }
                    if !seen_root {
                        exn::bail!(ErrorKind::InvalidDocument);
                    }
                    break;
                },
                // Declarations, comments, processing instructions and doctypes
                // carry no metadata.
                _ => {},
            }
            self.buffer.clear();
        }
        Ok(fields.into_metadata())
    }
}

/// Enforces a single `FictionBook` root element.
fn check_root(name: &[u8], stack: &[Vec<u8>], seen_root: &mut bool) -> Result<()> {
    if !stack.is_empty() {
        return Ok(());
    }
    if *seen_root {
        exn::bail!(ErrorKind::Malformed("content after the root element".to_string()));
    }
    if name != consts::ROOT {
        exn::bail!(ErrorKind::InvalidDocument);
    }
    *seen_root = true;
    Ok(())
}

/// An `<image href="...">` inside `<coverpage>` means the book has cover art.
/// Attributes of every element are walked so that broken ones are reported.
fn inspect_cover(start: &BytesStart<'_>, name: &[u8], parent: Option<&[u8]>, fields: &mut Fields) -> Result<()> {
    let is_cover = name == consts::IMAGE && parent == Some(consts::COVERPAGE);
    for attribute in start.attributes() {
        let attribute = attribute.or_raise(|| ErrorKind::Malformed("invalid attribute".to_string()))?;
        if is_cover && attribute.key.local_name().as_ref() == consts::HREF && !attribute.value.is_empty() {
            fields.has_cover = true;
        }
    }
    Ok(())
}

fn date_fallback(start: &BytesStart<'_>, field: Field, decoder: Decoder) -> Result<Option<String>> {
    if field != Field::Date {
        return Ok(None);
    }
    let value = start
        .try_get_attribute(consts::VALUE)
        .or_raise(|| ErrorKind::Malformed("invalid attribute".to_string()))?;
    match value {
        Some(value) => {
            let value = value
                .decode_and_unescape_value(decoder)
                .or_raise(|| ErrorKind::Malformed("invalid attribute value".to_string()))?;
            Ok(Some(value.trim().to_string()))
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const REPUBLIC: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
  <description>
    <title-info>
      <genre>antique_european</genre>
      <genre>sci_philosophy</genre>
      <author>
        <first-name>Plato</first-name>
        <last-name>Athenian</last-name>
      </author>
      <author>
        <first-name>Benjamin</first-name>
        <last-name>Jowett</last-name>
      </author>
      <book-title>The Republic of Plato</book-title>
      <annotation>
        <p>A Socratic dialogue concerning justice.</p>
        <p>Written around <emphasis>375 BC</emphasis>.</p>
      </annotation>
      <date value="1871-01-01">1871</date>
      <coverpage><image l:href="#cover.jpg"/></coverpage>
      <lang>en</lang>
    </title-info>
    <document-info>
      <author><nickname>converter</nickname></author>
      <date value="2010-05-01"/>
    </document-info>
  </description>
  <body><section><p>Socrates: I went down yesterday to the Piraeus.</p></section></body>
  <binary id="cover.jpg" content-type="image/jpeg">AAAA</binary>
</FictionBook>
"##;

    fn extract(xml: &str) -> Result<Metadata> {
        Extractor::new(xml.as_bytes()).metadata()
    }

    #[test]
    fn test_extracts_all_fields() {
        let metadata = extract(REPUBLIC).unwrap();
        assert_eq!(metadata.title, "The Republic of Plato");
        assert_eq!(metadata.author, Author::new("Plato", "Athenian"));
        assert_eq!(metadata.annotation, "A Socratic dialogue concerning justice.\nWritten around 375 BC.");
        assert_eq!(metadata.genre, "antique_european");
        assert_eq!(metadata.date, "1871");
        assert_eq!(metadata.language, "en");
        assert!(metadata.has_cover);
    }

    #[test]
    fn test_first_match_wins() {
        let xml = r#"<FictionBook><description><title-info>
            <book-title>First</book-title>
            <book-title>Second</book-title>
        </title-info><src-title-info><book-title>Original</book-title><lang>el</lang></src-title-info>
        </description></FictionBook>"#;
        let metadata = extract(xml).unwrap();
        assert_eq!(metadata.title, "First");
        assert_eq!(metadata.language, "el");
    }

    #[test]
    fn test_missing_elements_are_empty() {
        let metadata = extract("<FictionBook><description/></FictionBook>").unwrap();
        assert_eq!(metadata, Metadata::default());
    }

    #[test]
    fn test_date_falls_back_to_value_attribute() {
        let xml = r#"<FictionBook><title-info><date value="1999-12-31"></date></title-info></FictionBook>"#;
        assert_eq!(extract(xml).unwrap().date, "1999-12-31");
        let xml = r#"<FictionBook><title-info><date value="1999-12-31"/></title-info></FictionBook>"#;
        assert_eq!(extract(xml).unwrap().date, "1999-12-31");
    }

    #[test]
    fn test_names_outside_author_are_ignored() {
        let xml = r#"<FictionBook><title-info>
            <translator><first-name>Not</first-name><last-name>Author</last-name></translator>
            <author><first-name>Homer</first-name></author>
        </title-info></FictionBook>"#;
        let metadata = extract(xml).unwrap();
        assert_eq!(metadata.author, Author::new("Homer", ""));
    }

    #[test]
    fn test_cover_requires_href() {
        let xml = r#"<FictionBook><coverpage><image/></coverpage></FictionBook>"#;
        assert!(!extract(xml).unwrap().has_cover);
        let xml = r#"<FictionBook><body><image xlink:href="x.png"/></body></FictionBook>"#;
        assert!(!extract(xml).unwrap().has_cover);
    }

    #[test]
    fn test_cdata_and_entities() {
        let xml = r#"<FictionBook><book-title>Tom &amp; <![CDATA[Jerry]]></book-title></FictionBook>"#;
        assert_eq!(extract(xml).unwrap().title, "Tom & Jerry");
    }

    #[test]
    fn test_inline_markup_keeps_spacing() {
        let xml = "<FictionBook><book-title>  The <emphasis>Odyssey</emphasis>,\n   Book   I </book-title></FictionBook>";
        assert_eq!(extract(xml).unwrap().title, "The Odyssey, Book I");
    }

    #[test]
    fn test_declared_encoding_applies_to_cdata() {
        // "Мир" in windows-1251.
        let mut xml = b"<?xml version=\"1.0\" encoding=\"windows-1251\"?>\n<FictionBook><book-title><![CDATA[".to_vec();
        xml.extend_from_slice(&[0xCC, 0xE8, 0xF0]);
        xml.extend_from_slice(b"]]></book-title><lang>ru</lang></FictionBook>");
        let metadata = Extractor::new(xml.as_slice()).metadata().unwrap();
        assert_eq!(metadata.title, "Мир");
        assert_eq!(metadata.language, "ru");
    }

    #[test]
    fn test_not_a_fictionbook() {
        let err = extract("<html><body>nope</body></html>").unwrap_err();
        assert_eq!(&*err, &ErrorKind::InvalidDocument);
        let err = extract("").unwrap_err();
        assert_eq!(&*err, &ErrorKind::InvalidDocument);
    }

    #[rstest]
    #[case::truncated("<FictionBook><description><title-info><book-title>Half")]
    #[case::mismatched("<FictionBook><book-title>Title</genre></FictionBook>")]
    #[case::unmatched_end("<FictionBook></book-title></FictionBook>")]
    #[case::second_root("<FictionBook></FictionBook><FictionBook></FictionBook>")]
    #[case::trailing_text("<FictionBook></FictionBook>garbage")]
    #[case::bad_attribute("<FictionBook><image href=oops/></FictionBook>")]
    #[case::unknown_entity("<FictionBook><book-title>&nbsp;</book-title></FictionBook>")]
    fn test_malformed_documents_fail(#[case] xml: &str) {
        let err = extract(xml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Malformed(_)), "unexpected error kind: {:?}", &*err);
    }

    #[test]
    fn test_malformed_after_metadata_still_fails() {
        // Metadata is complete before the body, but a broken body must not
        // produce a best-effort record.
        let xml = REPUBLIC.replace("</section></body>", "</body>");
        assert!(extract(&xml).is_err());
    }
}
