use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use log::debug;

use crate::error::ParseError;
use crate::lines::{Line, SceneLines};
use crate::primitive::{PrimitiveKind, PrimitiveRecord};

/// Upper bound on records reserved up front for one kind.
const PREALLOC_LIMIT: usize = 1024;

/// Reads counts and primitive records off a comment-skipping line cursor.
pub struct PrimitiveParser<R> {
    lines: SceneLines<R>,
}

impl<R: BufRead> PrimitiveParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: SceneLines::new(reader),
        }
    }

    /// Read one line holding a single non-negative integer.
    pub fn read_count(&mut self) -> Result<usize, ParseError> {
        let Line { number, text } = self.lines.next_line()?;

        text.trim()
            .parse::<i64>()
            .ok()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(ParseError::MalformedCount {
                line: number,
                content: text,
            })
    }

    /// Read one record line of the given kind.
    ///
    /// Every token is parsed first (identifier as integer, the rest as
    /// floats); only then is the field count checked against the kind.
    pub fn read_record(&mut self, kind: PrimitiveKind) -> Result<PrimitiveRecord, ParseError> {
        let Line { number, text } = self.lines.next_line()?;
        let mut tokens = text.split_whitespace();

        let Some(first) = tokens.next() else {
            return Err(ParseError::ArityMismatch {
                line: number,
                kind,
                expected: kind.arity(),
                actual: 0,
                content: text,
            });
        };

        let id = first.parse::<i64>().map_err(|_| ParseError::NumericParse {
            line: number,
            token: first.to_owned(),
            expected: "integer",
        })?;

        let params = tokens
            .map(|token| {
                token.parse::<f64>().map_err(|_| ParseError::NumericParse {
                    line: number,
                    token: token.to_owned(),
                    expected: "float",
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let actual = params.len() + 1;
        PrimitiveRecord::new(kind, id, params).ok_or(ParseError::ArityMismatch {
            line: number,
            kind,
            expected: kind.arity(),
            actual,
            content: text,
        })
    }

    /// Run the whole-file protocol: three counts, then each record group
    /// in fixed kind order.
    pub fn read_scene(&mut self) -> Result<SceneDescription, ParseError> {
        let mut counts = [0usize; 3];
        for count in counts.iter_mut() {
            *count = self.read_count()?;
        }

        debug!(
            "Scene counts: {} spheres, {} cylinders, {} cubes",
            counts[0], counts[1], counts[2]
        );

        let mut scene = SceneDescription::default();
        for (kind, count) in PrimitiveKind::ALL.into_iter().zip(counts) {
            // Counts come straight from the file; grow as records arrive.
            scene.records_mut(kind).reserve(count.min(PREALLOC_LIMIT));
            for _ in 0..count {
                let record = self.read_record(kind)?;
                scene.records_mut(kind).push(record);
            }
        }

        debug!(
            "Read {} records over {} lines",
            scene.len(),
            self.lines.line_number()
        );

        Ok(scene)
    }
}

/// All records of one scene file, grouped by kind in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDescription {
    spheres: Vec<PrimitiveRecord>,
    cylinders: Vec<PrimitiveRecord>,
    cubes: Vec<PrimitiveRecord>,
}

impl SceneDescription {
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ParseError> {
        PrimitiveParser::new(reader).read_scene()
    }

    /// Parse a scene file; the handle is closed before this returns,
    /// whether parsing succeeded or not.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn parse_str(text: &str) -> Result<Self, ParseError> {
        Self::from_reader(Cursor::new(text.as_bytes()))
    }

    #[inline]
    pub fn records(&self, kind: PrimitiveKind) -> &[PrimitiveRecord] {
        match kind {
            PrimitiveKind::Sphere => &self.spheres,
            PrimitiveKind::Cylinder => &self.cylinders,
            PrimitiveKind::Cube => &self.cubes,
        }
    }

    /// Append a record to the group matching its kind.
    pub fn push(&mut self, record: PrimitiveRecord) {
        self.records_mut(record.kind()).push(record);
    }

    fn records_mut(&mut self, kind: PrimitiveKind) -> &mut Vec<PrimitiveRecord> {
        match kind {
            PrimitiveKind::Sphere => &mut self.spheres,
            PrimitiveKind::Cylinder => &mut self.cylinders,
            PrimitiveKind::Cube => &mut self.cubes,
        }
    }

    pub fn len(&self) -> usize {
        self.spheres.len() + self.cylinders.len() + self.cubes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the scene back into the file format (counts, then records).
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for kind in PrimitiveKind::ALL {
            out.push_str(&self.records(kind).len().to_string());
            out.push('\n');
        }
        for kind in PrimitiveKind::ALL {
            for record in self.records(kind) {
                out.push_str(&record.to_line());
                out.push('\n');
            }
        }
        out
    }
}
