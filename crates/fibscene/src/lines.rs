use std::io::BufRead;

use crate::error::ParseError;

/// Lines starting with this character are skipped wherever a line is expected.
pub const COMMENT_MARKER: char = '#';

/// A meaningful (non-comment) line and its 1-based position in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub text: String,
}

/// Forward-only cursor over the non-comment lines of a scene stream.
///
/// Lines are returned verbatim apart from the line terminator: no trimming,
/// and inline `#` characters are left alone. Only a marker in the very first
/// column turns a line into a comment.
pub struct SceneLines<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> SceneLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Number of physical lines consumed so far, comments included.
    pub fn line_number(&self) -> usize {
        self.line_no
    }

    /// Next non-comment line; running out of input here is an error.
    pub fn next_line(&mut self) -> Result<Line, ParseError> {
        match self.advance()? {
            Some(line) => Ok(line),
            None => Err(ParseError::EndOfInput { line: self.line_no }),
        }
    }

    fn advance(&mut self) -> Result<Option<Line>, ParseError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            if self.buf.starts_with(COMMENT_MARKER) {
                continue;
            }

            let text = self
                .buf
                .strip_suffix('\n')
                .map(|s| s.strip_suffix('\r').unwrap_or(s))
                .unwrap_or(&self.buf);

            return Ok(Some(Line {
                number: self.line_no,
                text: text.to_owned(),
            }));
        }
    }
}
