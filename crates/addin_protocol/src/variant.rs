//! The variant value type exchanged across the add-in boundary.
//!
//! A [`Variant`] is the tagged union the host passes to add-in functions and
//! receives back from them: a number, explicit-length UTF-16 text, a
//! row-major array, or a cell error. Each value carries an ownership tag
//! (the `dll_free` bit) telling the receiver whether it must reclaim the
//! backing storage through the host's free callback, plus the handle of the
//! tracked allocation backing it, when there is one.

use serde::{Deserialize, Serialize};

/// Handle of a tracked backing allocation, assigned by the host allocator.
///
/// The handle is opaque to add-ins; they obtain one from the host when
/// allocating storage for a value they intend to return, and attach it to
/// the [`Variant`] so the eventual release can find the bookkeeping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllocId(pub u64);

impl std::fmt::Display for AllocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a tracked allocation backs. Opaque to the bookkeeping itself;
/// carried so leak reports can say what kind of storage went missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocKind {
    /// A single variant cell.
    Value,
    /// A text payload buffer.
    Text,
    /// An array payload.
    Array,
}

/// Cell error codes surfaced through the variant type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Null,
    Div0,
    Value,
    Ref,
    Name,
    Num,
    Na,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "#NULL!",
            Self::Div0 => "#DIV/0!",
            Self::Value => "#VALUE!",
            Self::Ref => "#REF!",
            Self::Name => "#NAME?",
            Self::Num => "#NUM!",
            Self::Na => "#N/A",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest text payload a concatenation will produce, in UTF-16 units.
pub const MAX_TEXT_UNITS: usize = 255;

/// UTF-16 text with an explicit, authoritative length.
///
/// The length field decides where the text ends; the buffer may hold spare
/// capacity past it, and whatever sits there is garbage the receiver must
/// ignore. Equality, ordering, and display all honor the explicit length
/// only, never a terminator scan.
#[derive(Debug, Clone, Default)]
pub struct WideString {
    units: Vec<u16>,
    len: usize,
}

impl WideString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a raw unit buffer, taking the first `len` units as the text.
    /// `len` is clamped to the buffer size; trailing units stay in place
    /// but are not part of the value.
    pub fn from_units(units: Vec<u16>, len: usize) -> Self {
        let len = len.min(units.len());
        Self { units, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The text's units: exactly `len` of them, never the spare storage.
    pub fn units(&self) -> &[u16] {
        &self.units[..self.len]
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(self.units())
    }

    /// Concatenate, capping the result at `cap` units. Units past the cap
    /// are dropped from the tail.
    pub fn concat_capped(&self, other: &Self, cap: usize) -> Self {
        let take_first = self.len.min(cap);
        let take_second = other.len.min(cap - take_first);
        let mut units = Vec::with_capacity(take_first + take_second);
        units.extend_from_slice(&self.units()[..take_first]);
        units.extend_from_slice(&other.units()[..take_second]);
        Self { len: units.len(), units }
    }
}

impl PartialEq for WideString {
    fn eq(&self, other: &Self) -> bool {
        self.units() == other.units()
    }
}

impl Eq for WideString {}

impl std::hash::Hash for WideString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.units().hash(state);
    }
}

impl From<&str> for WideString {
    fn from(s: &str) -> Self {
        let units: Vec<u16> = s.encode_utf16().collect();
        Self { len: units.len(), units }
    }
}

impl From<String> for WideString {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl std::fmt::Display for WideString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// The payload of a [`Variant`].
#[derive(Debug, Clone, PartialEq)]
pub enum VariantData {
    /// No value; also the default element of a fresh array.
    Nil,
    Num(f64),
    Str(WideString),
    /// Row-major array of variants, `rows * cols` values.
    Multi {
        rows: usize,
        cols: usize,
        values: Vec<Variant>,
    },
    Err(ErrorCode),
}

/// A tagged value crossing the add-in boundary.
///
/// The `dll_free` bit is the ownership tag: when set, the producing
/// function allocated the backing storage and the receiver must release it
/// through the host exactly once. When clear, the storage is borrowed from
/// the caller or lives in framework-owned temporary storage, and the
/// receiver must not free it.
#[derive(Debug, Clone)]
pub struct Variant {
    data: VariantData,
    dll_free: bool,
    alloc: Option<AllocId>,
}

impl Variant {
    pub const fn nil() -> Self {
        Self { data: VariantData::Nil, dll_free: false, alloc: None }
    }

    pub fn num(value: f64) -> Self {
        Self { data: VariantData::Num(value), dll_free: false, alloc: None }
    }

    pub fn text(text: impl Into<WideString>) -> Self {
        Self { data: VariantData::Str(text.into()), dll_free: false, alloc: None }
    }

    /// A `rows x cols` array with every element default-initialized to nil.
    pub fn array(rows: usize, cols: usize) -> Self {
        Self {
            data: VariantData::Multi { rows, cols, values: vec![Self::nil(); rows * cols] },
            dll_free: false,
            alloc: None,
        }
    }

    pub fn error(code: ErrorCode) -> Self {
        Self { data: VariantData::Err(code), dll_free: false, alloc: None }
    }

    /// Tag the value as owned-by-callee: the receiver must release it.
    #[must_use]
    pub fn mark_owned(mut self) -> Self {
        self.dll_free = true;
        self
    }

    /// Attach the tracked allocation backing this value.
    #[must_use]
    pub fn with_alloc(mut self, id: AllocId) -> Self {
        self.alloc = Some(id);
        self
    }

    pub fn is_owned(&self) -> bool {
        self.dll_free
    }

    pub fn alloc(&self) -> Option<AllocId> {
        self.alloc
    }

    pub fn data(&self) -> &VariantData {
        &self.data
    }

    pub fn as_num(&self) -> Option<f64> {
        match self.data {
            VariantData::Num(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&WideString> {
        match &self.data {
            VariantData::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<(usize, usize, &[Variant])> {
        match &self.data {
            VariantData::Multi { rows, cols, values } => Some((*rows, *cols, values.as_slice())),
            _ => None,
        }
    }

    /// Truthiness for flag-style numeric arguments: any nonzero number.
    pub fn is_truthy(&self) -> bool {
        matches!(self.data, VariantData::Num(v) if v != 0.0)
    }

    /// Overwrite the payload with a number in place. Callers with reusable
    /// per-thread argument slots use this instead of building a fresh value
    /// each call.
    pub fn set_num(&mut self, value: f64) {
        self.data = VariantData::Num(value);
    }

    pub fn element(&self, row: usize, col: usize) -> Option<&Variant> {
        match &self.data {
            VariantData::Multi { rows, cols, values } if row < *rows && col < *cols => {
                values.get(row * *cols + col)
            }
            _ => None,
        }
    }

    /// Write one array element. Returns false (and writes nothing) when the
    /// value is not an array or the position is out of bounds.
    pub fn set_element(&mut self, row: usize, col: usize, value: Variant) -> bool {
        match &mut self.data {
            VariantData::Multi { rows, cols, values } if row < *rows && col < *cols => {
                values[row * *cols + col] = value;
                true
            }
            _ => false,
        }
    }

    /// Short tag for log lines.
    pub fn kind_str(&self) -> &'static str {
        match self.data {
            VariantData::Nil => "nil",
            VariantData::Num(_) => "num",
            VariantData::Str(_) => "str",
            VariantData::Multi { .. } => "multi",
            VariantData::Err(_) => "err",
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::nil()
    }
}

// Value equality: the ownership tag and allocation handle are bookkeeping,
// not part of the value.
impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            VariantData::Nil => f.write_str("(nil)"),
            VariantData::Num(v) => write!(f, "{v}"),
            VariantData::Str(s) => write!(f, "{s}"),
            VariantData::Multi { rows, cols, .. } => write!(f, "[{rows}x{cols}]"),
            VariantData::Err(code) => write!(f, "{code}"),
        }
    }
}
