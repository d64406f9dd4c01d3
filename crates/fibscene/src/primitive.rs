use std::fmt;

/// The three primitive kinds a scene can hold, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Sphere,
    Cylinder,
    Cube,
}

impl PrimitiveKind {
    /// File order: counts and record groups always appear in this sequence.
    pub const ALL: [PrimitiveKind; 3] = [Self::Sphere, Self::Cylinder, Self::Cube];

    /// Field count of a record line, leading identifier included.
    #[inline]
    pub const fn arity(self) -> usize {
        match self {
            Self::Sphere => 5,
            Self::Cylinder => 9,
            Self::Cube => 10,
        }
    }

    /// Column count of the encoded row handed to the extractor.
    #[inline]
    pub const fn row_width(self) -> usize {
        match self {
            Self::Sphere => 4,
            Self::Cylinder => 9,
            Self::Cube => 10,
        }
    }

    /// Whether records of this kind carry Z-X-Z Euler angles.
    #[inline]
    pub const fn is_oriented(self) -> bool {
        !matches!(self, Self::Sphere)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveKind::Sphere => "sphere",
            PrimitiveKind::Cylinder => "cylinder",
            PrimitiveKind::Cube => "cube",
        };

        f.write_str(s)
    }
}

/// One primitive: the identifier plus the kind-specific numeric fields
/// (`kind.arity() - 1` of them, in file order).
///
/// Fields are private so the field count always matches the kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveRecord {
    kind: PrimitiveKind,
    id: i64,
    params: Vec<f64>,
}

impl PrimitiveRecord {
    /// `None` unless `params` holds exactly `kind.arity() - 1` values.
    pub fn new(kind: PrimitiveKind, id: i64, params: Vec<f64>) -> Option<Self> {
        (params.len() + 1 == kind.arity()).then_some(Self { kind, id, params })
    }

    #[inline]
    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }

    #[inline]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[inline]
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Anchor voxel index `(x, y, z)` as written in the file.
    #[inline]
    pub fn position(&self) -> [f64; 3] {
        [self.params[0], self.params[1], self.params[2]]
    }

    /// Euler angles `(e1, e2, e3)` for oriented kinds.
    pub fn euler(&self) -> Option<[f64; 3]> {
        self.kind
            .is_oriented()
            .then(|| [self.params[3], self.params[4], self.params[5]])
    }

    /// Size fields following the position (and angles): radius, or
    /// radius and length, or three extents.
    #[inline]
    pub fn dimensions(&self) -> &[f64] {
        let start = if self.kind.is_oriented() { 6 } else { 3 };
        &self.params[start..]
    }

    /// Render the record back into the scene-file line format.
    ///
    /// Floats use Rust's shortest round-trip formatting, so parsing the
    /// line again yields bit-identical values.
    pub fn to_line(&self) -> String {
        let mut line = self.id.to_string();
        for value in &self.params {
            line.push(' ');
            line.push_str(&value.to_string());
        }
        line
    }
}
