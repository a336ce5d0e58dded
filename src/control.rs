// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian control file primitives.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>
for the canonical source of truth for how control files work.

A control file is an ordered sequence of *paragraphs* separated by blank
lines. A paragraph is an ordered sequence of `Name: value` fields. Values
may span multiple lines: continuation lines begin with a single space and
an empty continuation line is encoded as ` .`.
*/

use {
    crate::error::{DebcacheError, Result},
    std::{
        borrow::Cow,
        io::{BufRead, Write},
    },
};

/// A field in a control file.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField<'a> {
    name: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl<'a> ControlField<'a> {
    /// Construct an instance from a field name and value.
    pub fn new(name: Cow<'a, str>, value: Cow<'a, str>) -> Self {
        Self { name, value }
    }

    /// Construct an instance from an iterable of logical lines.
    ///
    /// Lines should not carry the leading continuation space; an empty first
    /// line yields a field whose value starts on the following line.
    pub fn from_lines(
        name: Cow<'a, str>,
        lines: impl Iterator<Item = impl ToString>,
    ) -> Self {
        let value = lines
            .map(|line| line.to_string())
            .collect::<Vec<_>>()
            .join("\n")
            .into();

        Self { name, value }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Obtain the value as a [&str], newlines and all.
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }

    /// Obtain an iterator of logical lines in the value.
    pub fn iter_lines(&self) -> impl Iterator<Item = &str> {
        self.value.lines()
    }

    /// Write the contents of this field to a writer.
    ///
    /// Logical lines after the first are emitted as continuation lines,
    /// prefixed with a single space. Empty continuation lines are emitted
    /// as ` .`.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(b": ")?;

        for (i, line) in self.value.split('\n').enumerate() {
            if i > 0 {
                writer.write_all(if line.is_empty() { b" ." } else { b" " })?;
            }
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }

        Ok(())
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields. Field names are
/// case sensitive and unique within a paragraph; setting an existing name
/// replaces its value in place.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Whether the paragraph has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field via a [ControlField].
    ///
    /// An existing field of the same name keeps its position; otherwise the
    /// field is appended, preserving insertion order for emission.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == field.name) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
    }

    /// Set the value of a field defined via strings.
    pub fn set_field_from_string(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Whether a named field is present in this paragraph.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate over fields in this paragraph, in insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField<'a>> {
        self.fields.iter()
    }

    /// Obtain the field with a given name.
    pub fn field(&self, name: &str) -> Option<&ControlField<'a>> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Serialize the paragraph to a writer.
    ///
    /// No paragraph separator (blank line) is written.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

impl<'a> ToString for ControlParagraph<'a> {
    fn to_string(&self) -> String {
        let mut buf = vec![];
        self.write(&mut buf)
            .expect("write to Vec should not fail");
        String::from_utf8(buf).expect("paragraphs are UTF-8")
    }
}

/// Serialize a sequence of paragraphs to a writer.
///
/// Paragraphs are separated by a single blank line. No trailing separator
/// is emitted: the digests advertised in `Release` files are computed over
/// exactly these bytes.
pub fn write_paragraphs<'a, W: Write>(
    writer: &mut W,
    paragraphs: impl Iterator<Item = &'a ControlParagraph<'a>>,
) -> std::io::Result<()> {
    for (i, paragraph) in paragraphs.enumerate() {
        if i > 0 {
            writer.write_all(b"\n")?;
        }
        paragraph.write(writer)?;
    }

    Ok(())
}

/// Holds parsing state for Debian control files.
///
/// Instances are fed lines of text and periodically emit
/// [ControlParagraph] instances as they are completed.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph<'static>,
    field: Option<(String, String)>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress paragraph, that paragraph is
    /// returned. Otherwise `Ok(None)` is returned.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph<'static>>> {
        let line = line.trim_end_matches(['\r', '\n']);
        let is_empty_line = line.trim().is_empty();
        let is_continuation = line.starts_with(' ') || line.starts_with('\t');

        if is_empty_line {
            self.flush_field();

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        if is_continuation {
            let Some((_, value)) = self.field.as_mut() else {
                return Err(DebcacheError::ControlParseError(format!(
                    "continuation line without a field: {:?}",
                    line
                )));
            };

            // A solitary dot encodes an empty logical line.
            let rest = &line[1..];
            value.push('\n');
            if rest != "." {
                value.push_str(rest);
            }

            return Ok(None);
        }

        self.flush_field();

        let Some((name, value)) = line.split_once(':') else {
            return Err(DebcacheError::ControlParseError(format!(
                "error parsing line {:?}; missing colon",
                line
            )));
        };

        self.field = Some((
            name.to_string(),
            value.strip_prefix(' ').unwrap_or(value).to_string(),
        ));

        Ok(None)
    }

    /// Finish parsing, consuming self.
    ///
    /// Returns the final paragraph, if any state remains unflushed.
    pub fn finish(mut self) -> Result<Option<ControlParagraph<'static>>> {
        self.flush_field();

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self) {
        if let Some((name, value)) = self.field.take() {
            self.paragraph
                .set_field_from_string(Cow::Owned(name), Cow::Owned(value));
        }
    }
}

/// A reader of [ControlParagraph] from a [BufRead] source.
///
/// Instances can be consumed as an iterator. Each call into the iterator
/// will attempt to read a full paragraph from the underlying reader.
pub struct ControlParagraphReader<R: BufRead> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R: BufRead> ControlParagraphReader<R> {
    /// Create a new instance bound to a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    fn get_next(&mut self) -> Result<Option<ControlParagraph<'static>>> {
        let mut parser = self.parser.take().expect("parser should be present");

        loop {
            let mut line = String::new();

            if self.reader.read_line(&mut line)? == 0 {
                return parser.finish();
            }

            if let Some(paragraph) = parser.write_line(&line)? {
                self.parser.replace(parser);
                return Ok(Some(paragraph));
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.parser.is_none() {
            None
        } else {
            match self.get_next() {
                Ok(Some(para)) => Some(Ok(para)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }
    }
}

/// Parse all paragraphs from a string.
pub fn parse_paragraphs(s: &str) -> Result<Vec<ControlParagraph<'static>>> {
    ControlParagraphReader::new(std::io::Cursor::new(s.as_bytes())).collect()
}
