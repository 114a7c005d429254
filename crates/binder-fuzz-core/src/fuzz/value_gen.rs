//! Typed random argument generation for `service call` transactions.
//!
//! Each [`InputTypeSpec`] slot expands into zero or more `service call`
//! argument tokens (`"i32 42"`, `"s16 \"abc\""`, `"null"`, ...). Constraints
//! from the catalog are honored; unconstrained slots fall back to fixed
//! defaults. Draws are uniform, there is no boundary weighting.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::catalog::{Bound, InputTypeSpec};

pub const DEFAULT_INT_MIN: i64 = -(1 << 31);
pub const DEFAULT_INT_MAX: i64 = (1 << 31) - 1;
pub const DEFAULT_STRING_MIN_LENGTH: usize = 1;
pub const DEFAULT_STRING_MAX_LENGTH: usize = 100;

/// `iarr` element count is uniform in `0..=INT_ARRAY_MAX_LEN`.
pub const INT_ARRAY_MAX_LEN: usize = 1019;
/// `sarr` element count is uniform in `0..=STRING_ARRAY_MAX_LEN`.
pub const STRING_ARRAY_MAX_LEN: usize = 50;

const FLOAT_DEFAULT_SPAN: f64 = 1.0e38;
const FLOAT_DIGITS: i32 = 6;
const DOUBLE_DEFAULT_SPAN: f64 = 1.0e308;
const DOUBLE_DIGITS: i32 = 12;

// Flat character set: printable ASCII followed by the extended band. The
// extended band ends at U+C34F, below the surrogate block (U+D800..U+DFFF),
// so every index maps to a valid `char`.
const PRINTABLE_FIRST: u32 = 32;
const PRINTABLE_LEN: u32 = 127 - 32;
const EXTENDED_FIRST: u32 = 128;
const EXTENDED_LEN: u32 = 50_000 - 128;
const CHARSET_LEN: u32 = PRINTABLE_LEN + EXTENDED_LEN;

/// Argument type tags understood by `service call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputTag {
    I32,
    I64,
    /// Array of `i32` values, flattened into one token per element.
    IntArray,
    /// Array of `s16` values, flattened into one token per element.
    StringArray,
    Float,
    Double,
    String16,
    Null,
    Fd,
    AshmemFd,
    /// Numeric file descriptor.
    NumFd,
}

impl InputTag {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "i32" => Self::I32,
            "i64" => Self::I64,
            "iarr" => Self::IntArray,
            "sarr" => Self::StringArray,
            "f" => Self::Float,
            "d" => Self::Double,
            "s16" => Self::String16,
            "null" => Self::Null,
            "fd" => Self::Fd,
            "afd" => Self::AshmemFd,
            "nfd" => Self::NumFd,
            _ => return None,
        })
    }

    /// Catalog spelling of the tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::IntArray => "iarr",
            Self::StringArray => "sarr",
            Self::Float => "f",
            Self::Double => "d",
            Self::String16 => "s16",
            Self::Null => "null",
            Self::Fd => "fd",
            Self::AshmemFd => "afd",
            Self::NumFd => "nfd",
        }
    }
}

impl std::fmt::Display for InputTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A slot that produced no tokens. The `Display` text is the log line body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("Unsupported input type: {0}, skipping...")]
    Unsupported(String),
    #[error("Missing {field} for {tag} input, skipping...")]
    MissingField {
        tag: &'static str,
        field: &'static str,
    },
}

/// Random argument generator. One per worker; never shared.
pub struct ValueGenerator<R = StdRng> {
    rng: R,
}

impl ValueGenerator<StdRng> {
    /// Create a deterministic generator from a seed.
    pub fn new(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Create a generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl<R: Rng> ValueGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Generate the argument tokens for one slot.
    pub fn generate(&mut self, slot: &InputTypeSpec) -> Result<Vec<String>, SlotError> {
        let Some(tag) = slot.tag() else {
            return Err(SlotError::Unsupported(slot.type_label().to_string()));
        };

        let tokens = match tag {
            InputTag::I32 | InputTag::I64 => {
                vec![format!("{} {}", tag, self.gen_int(slot.range))]
            }
            InputTag::IntArray => {
                let count = self.rng.gen_range(0..=INT_ARRAY_MAX_LEN);
                (0..count)
                    .map(|_| format!("i32 {}", self.gen_int(slot.range)))
                    .collect()
            }
            InputTag::StringArray => {
                // Element strings are unquoted, and `range` doubles as the
                // length constraint when `length` is absent.
                let length = slot.length.or(slot.range);
                let count = self.rng.gen_range(0..=STRING_ARRAY_MAX_LEN);
                (0..count)
                    .map(|_| format!("s16 {}", self.gen_string(length)))
                    .collect()
            }
            InputTag::Float => {
                let v = self.gen_real(slot.range, FLOAT_DEFAULT_SPAN, FLOAT_DIGITS);
                vec![format!("f {v}")]
            }
            InputTag::Double => {
                let v = self.gen_real(slot.range, DOUBLE_DEFAULT_SPAN, DOUBLE_DIGITS);
                vec![format!("d {v}")]
            }
            InputTag::String16 => {
                vec![format!("s16 \"{}\"", self.gen_string(slot.length))]
            }
            InputTag::Null => vec!["null".to_string()],
            InputTag::Fd => vec![format!("fd {}", required_file(slot, tag)?)],
            InputTag::AshmemFd => vec![format!("afd {}", required_file(slot, tag)?)],
            InputTag::NumFd => {
                let num = slot.num.ok_or(SlotError::MissingField {
                    tag: tag.as_str(),
                    field: "num",
                })?;
                // NOTE: nfd is emitted with the afd prefix.
                vec![format!("afd {num}")]
            }
        };

        Ok(tokens)
    }

    // ---- Primitive generators ----

    fn gen_int(&mut self, range: Option<(Bound, Bound)>) -> i64 {
        let (lo, hi) = match range {
            Some((min, max)) => ordered(min.as_i64(), max.as_i64()),
            None => (DEFAULT_INT_MIN, DEFAULT_INT_MAX),
        };
        self.rng.gen_range(lo..=hi)
    }

    fn gen_real(&mut self, range: Option<(Bound, Bound)>, default_span: f64, digits: i32) -> f64 {
        let (lo, hi) = match range {
            Some((min, max)) => {
                let (a, b) = (min.as_f64(), max.as_f64());
                if a > b {
                    (b, a)
                } else {
                    (a, b)
                }
            }
            None => (-default_span, default_span),
        };
        round_to(self.uniform_real(lo, hi), digits)
    }

    /// Uniform draw in `[lo, hi]` that stays finite when `hi - lo` overflows.
    fn uniform_real(&mut self, lo: f64, hi: f64) -> f64 {
        if lo == hi {
            return lo;
        }
        let t: f64 = self.rng.gen();
        (lo * (1.0 - t) + hi * t).clamp(lo, hi)
    }

    fn gen_string(&mut self, length: Option<(Bound, Bound)>) -> String {
        let (lo, hi) = match length {
            Some((min, max)) => {
                let (a, b) = ordered(min.as_i64().max(0), max.as_i64().max(0));
                (a as usize, b as usize)
            }
            None => (DEFAULT_STRING_MIN_LENGTH, DEFAULT_STRING_MAX_LENGTH),
        };
        let len = self.rng.gen_range(lo..=hi);
        (0..len).map(|_| self.gen_char()).collect()
    }

    fn gen_char(&mut self) -> char {
        let idx = self.rng.gen_range(0..CHARSET_LEN);
        let cp = if idx < PRINTABLE_LEN {
            PRINTABLE_FIRST + idx
        } else {
            EXTENDED_FIRST + (idx - PRINTABLE_LEN)
        };
        char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

fn required_file(slot: &InputTypeSpec, tag: InputTag) -> Result<&str, SlotError> {
    slot.file.as_deref().ok_or(SlotError::MissingField {
        tag: tag.as_str(),
        field: "file",
    })
}

fn ordered(a: i64, b: i64) -> (i64, i64) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}

/// Round to `digits` decimal places. Values whose scaled magnitude is beyond
/// exact integer precision are already coarser than the requested digits and
/// are returned unchanged.
fn round_to(v: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    let scaled = v * scale;
    if !scaled.is_finite() || scaled.abs() >= 9_007_199_254_740_992.0 {
        return v;
    }
    scaled.round() / scale
}
