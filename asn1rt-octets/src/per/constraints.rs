//! PER visible constraints
//!
//! Constraint records are immutable once built and may be shared between
//! threads (`PerConstraints` is `Send + Sync`).

use std::fmt;
use std::sync::Arc;

/// Boundary of lengths encodable with a constrained length field (X.691 11.9.4.1)
pub const CONSTRAINED_LENGTH_LIMIT: i64 = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConstraintKind {
    #[default]
    Unconstrained,
    /// Lower bound only
    SemiConstrained,
    /// Lower and upper bound
    Constrained,
}

/// Constraint on a value range or on a size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PerConstraint {
    pub kind: ConstraintKind,
    /// `...` present in the constraint
    pub extensible: bool,
    pub lower_bound: i64,
    pub upper_bound: i64,
}

impl PerConstraint {
    pub const fn unconstrained() -> Self {
        Self {
            kind: ConstraintKind::Unconstrained,
            extensible: false,
            lower_bound: 0,
            upper_bound: 0,
        }
    }

    pub const fn semi_constrained(lower_bound: i64) -> Self {
        Self {
            kind: ConstraintKind::SemiConstrained,
            extensible: false,
            lower_bound,
            upper_bound: 0,
        }
    }

    pub const fn constrained(lower_bound: i64, upper_bound: i64) -> Self {
        Self {
            kind: ConstraintKind::Constrained,
            extensible: false,
            lower_bound,
            upper_bound,
        }
    }

    /// `SIZE(n)`
    pub const fn fixed(size: i64) -> Self {
        Self::constrained(size, size)
    }

    /// The same constraint with an extension marker
    pub const fn extensible(self) -> Self {
        Self {
            extensible: true,
            ..self
        }
    }

    pub fn is_constrained(&self) -> bool {
        self.kind == ConstraintKind::Constrained
    }

    /// Number of values in the range, 0 unless constrained
    ///
    /// Saturates at `u64::MAX` for a range covering all of `i64`.
    pub fn range(&self) -> u64 {
        if self.is_constrained() && self.upper_bound >= self.lower_bound {
            self.upper_bound.abs_diff(self.lower_bound).saturating_add(1)
        } else {
            0
        }
    }

    /// Bits needed to encode `value - lower_bound` for any value in range
    pub fn range_bits(&self) -> usize {
        let range = self.range();
        if range <= 1 {
            0
        } else {
            64 - (range - 1).leading_zeros() as usize
        }
    }

    /// Width of a constrained length field, `None` when lengths use the
    /// semi-constrained form instead
    ///
    /// `Some(0)` means the size is fixed and no length field is encoded.
    pub fn effective_bits(&self) -> Option<usize> {
        (self.is_constrained() && self.upper_bound < CONSTRAINED_LENGTH_LIMIT).then(|| self.range_bits())
    }

    /// Whether `value` satisfies the bounds
    pub fn contains(&self, value: i64) -> bool {
        match self.kind {
            ConstraintKind::Unconstrained => true,
            ConstraintKind::SemiConstrained => value >= self.lower_bound,
            ConstraintKind::Constrained => (self.lower_bound..=self.upper_bound).contains(&value),
        }
    }
}

/// Mapping between character values and their PER codes
///
/// Used for `FROM` alphabet constraints whose permitted characters do not
/// form a contiguous range.
pub trait CharacterMap: Send + Sync + fmt::Debug {
    /// Code of a permitted character value
    fn value_to_code(&self, value: u32) -> Option<u32>;

    /// Character value of a code
    fn code_to_value(&self, code: u32) -> Option<u32>;

    /// Width of one code in bits
    fn code_bits(&self) -> usize;
}

/// Permitted alphabet backed by a sorted character table
///
/// The code of a character is its index in the table (X.691 30.5.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermittedAlphabet {
    chars: Vec<u32>,
}

impl PermittedAlphabet {
    pub fn new(chars: impl IntoIterator<Item = u32>) -> Self {
        let mut chars: Vec<u32> = chars.into_iter().collect();
        chars.sort_unstable();
        chars.dedup();
        Self { chars }
    }

    pub fn from_chars(chars: &str) -> Self {
        Self::new(chars.chars().map(u32::from))
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Value constraint spanning the alphabet
    pub fn value_constraint(&self) -> PerConstraint {
        match (self.chars.first(), self.chars.last()) {
            (Some(&first), Some(&last)) => PerConstraint::constrained(i64::from(first), i64::from(last)),
            _ => PerConstraint::unconstrained(),
        }
    }
}

impl CharacterMap for PermittedAlphabet {
    fn value_to_code(&self, value: u32) -> Option<u32> {
        self.chars
            .binary_search(&value)
            .ok()
            .and_then(|index| u32::try_from(index).ok())
    }

    fn code_to_value(&self, code: u32) -> Option<u32> {
        usize::try_from(code)
            .ok()
            .and_then(|index| self.chars.get(index))
            .copied()
    }

    fn code_bits(&self) -> usize {
        match self.chars.len() {
            0 | 1 => 0,
            n => (usize::BITS - (n - 1).leading_zeros()) as usize,
        }
    }
}

/// Full PER constraint set of an OCTET STRING family type
#[derive(Debug, Clone, Default)]
pub struct PerConstraints {
    /// Bounds on each unit (character) value
    pub value: PerConstraint,
    /// Bounds on the number of units
    pub size: PerConstraint,
    /// Code table for non-contiguous alphabets
    pub alphabet: Option<Arc<dyn CharacterMap>>,
}

impl PerConstraints {
    /// No value constraint, size `(0..MAX)`
    pub fn new() -> Self {
        Self {
            value: PerConstraint::unconstrained(),
            size: PerConstraint::semi_constrained(0),
            alphabet: None,
        }
    }

    pub fn with_value(mut self, value: PerConstraint) -> Self {
        self.value = value;
        self
    }

    pub fn with_size(mut self, size: PerConstraint) -> Self {
        self.size = size;
        self
    }

    /// Use `alphabet` for unit codes, with the value constraint it spans
    pub fn with_alphabet(mut self, alphabet: PermittedAlphabet) -> Self {
        self.value = alphabet.value_constraint();
        self.alphabet = Some(Arc::new(alphabet));
        self
    }

    pub fn with_character_map(mut self, map: Arc<dyn CharacterMap>) -> Self {
        self.alphabet = Some(map);
        self
    }
}
