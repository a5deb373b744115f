//! # Genomic intervals
//!
//! Every query in this crate is expressed as an [`Interval`]: a sequence name plus a
//! 1-based, inclusive `first..=last` range. Records decoded from either backing can
//! be projected onto the same type, which lets callers compare results from text and
//! binary files directly.

use std::fmt;
use std::str::FromStr;

use crate::error::{QueryError, Result};

/// Strand of a genomic interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strand {
    /// `+`
    Forward,
    /// `-`
    Reverse,
    /// `?`, stranded but unknown
    Unknown,
    /// `.`, not stranded
    #[default]
    Both,
}
impl Strand {
    /// Parses a strand byte, returning `None` for anything outside of `+ - ? .`
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'+' => Some(Self::Forward),
            b'-' => Some(Self::Reverse),
            b'?' => Some(Self::Unknown),
            b'.' => Some(Self::Both),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Forward => b'+',
            Self::Reverse => b'-',
            Self::Unknown => b'?',
            Self::Both => b'.',
        }
    }
}
impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}

/// An immutable genomic interval carrying an arbitrary payload
///
/// Coordinates are 1-based and inclusive. An interval always covers at least one
/// base: construction fails when `first == 0` or `first > last`.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval<T> {
    seqname: String,
    first: u64,
    last: u64,
    strand: Strand,
    payload: T,
}
impl<T> Interval<T> {
    /// Creates a new interval
    ///
    /// # Parameters
    ///
    /// * `seqname` - Name of the sequence (chromosome, contig)
    /// * `first` - First covered base, 1-based
    /// * `last` - Last covered base, inclusive
    /// * `strand` - Strand of the interval
    /// * `payload` - Value attached to the interval
    ///
    /// # Errors
    ///
    /// * `QueryError::InvalidInterval` if `first == 0` or `first > last`
    pub fn new(
        seqname: impl Into<String>,
        first: u64,
        last: u64,
        strand: Strand,
        payload: T,
    ) -> Result<Self> {
        if first == 0 || first > last {
            return Err(QueryError::InvalidInterval { first, last }.into());
        }
        Ok(Self {
            seqname: seqname.into(),
            first,
            last,
            strand,
            payload,
        })
    }

    #[must_use]
    pub fn seqname(&self) -> &str {
        &self.seqname
    }

    #[must_use]
    pub fn first(&self) -> u64 {
        self.first
    }

    #[must_use]
    pub fn last(&self) -> u64 {
        self.last
    }

    #[must_use]
    pub fn strand(&self) -> Strand {
        self.strand
    }

    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Number of bases covered
    #[must_use]
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    /// Always false, an interval covers at least one base
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Start and end as a 0-based half-open pair
    #[must_use]
    pub fn zero_based(&self) -> (u64, u64) {
        (self.first - 1, self.last)
    }

    /// Checks whether two intervals share at least one base on the same sequence
    ///
    /// Strand is ignored.
    #[must_use]
    pub fn overlaps<U>(&self, other: &Interval<U>) -> bool {
        self.seqname == other.seqname && self.first <= other.last && other.first <= self.last
    }

    /// Replaces the payload, keeping coordinates
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Interval<U> {
        Interval {
            seqname: self.seqname,
            first: self.first,
            last: self.last,
            strand: self.strand,
            payload: f(self.payload),
        }
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// A query region: an interval without payload
pub type Region = Interval<()>;

impl Region {
    /// Creates an unstranded query region
    pub fn region(seqname: impl Into<String>, first: u64, last: u64) -> Result<Self> {
        Self::new(seqname, first, last, Strand::Both, ())
    }

    /// Region covering a whole sequence of the given length
    pub fn whole(seqname: impl Into<String>, length: u64) -> Result<Self> {
        Self::region(seqname, 1, length.max(1))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.seqname, self.first, self.last)
    }
}

/// Parses `name`, `name:pos` or `name:first-last`
///
/// Thousands separators in the numbers are accepted (`chr1:1,000-2,000`). A bare
/// name covers every base of the sequence. Only a suffix made of digits and at most
/// one `-` is read as a range, so `HLA-A*01:01:10-20` names `HLA-A*01:01` and
/// `contig:x` is a bare name. Braces keep a whole name that would otherwise parse
/// as a range: `{HLA-A*01:01}` or `{HLA-A*01:01}:5-9`.
impl FromStr for Region {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || -> crate::Error { QueryError::InvalidRegion(s.to_string()).into() };
        let (name, range) = if let Some(braced) = s.strip_prefix('{') {
            let (name, rest) = braced.split_once('}').ok_or_else(invalid)?;
            match rest {
                "" => (name, None),
                _ => (name, Some(rest.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else {
            match s.rsplit_once(':') {
                Some((name, range)) if is_range(range) => (name, Some(range)),
                _ => (s, None),
            }
        };
        if name.is_empty() {
            return Err(invalid());
        }
        let Some(range) = range else {
            return Self::region(name, 1, u64::from(u32::MAX));
        };
        let parse = |v: &str| -> Result<u64> {
            let cleaned: String = v.chars().filter(|c| *c != ',').collect();
            cleaned.parse::<u64>().map_err(|_| invalid())
        };
        let (first, last) = match range.split_once('-') {
            Some((a, b)) => (parse(a)?, parse(b)?),
            None => {
                let pos = parse(range)?;
                (pos, pos)
            }
        };
        Self::region(name, first, last)
    }
}

/// Whether `s` reads as `pos` or `first-last`
fn is_range(s: &str) -> bool {
    let number = |v: &str| {
        v.bytes().any(|b| b.is_ascii_digit()) && v.bytes().all(|b| b.is_ascii_digit() || b == b',')
    };
    match s.split_once('-') {
        Some((a, b)) => number(a) && number(b),
        None => number(s),
    }
}
