use std::{error, fmt, io};

use crate::Atom;

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

// -----------------------------------------------------------------------------
// Error

/// An enumeration of everything that can go wrong while resolving,
/// serializing or reconstructing a value.
///
/// All variants are unrecoverable for the operation that produced them and
/// carry enough context (type name, field offsets, enumerated field lists)
/// to diagnose the failure without re-running. Nothing here is retried
/// internally; once an archive reports an error its session is poisoned and
/// every later call fails with [`Error::Poisoned`] without touching the
/// underlying stream again.
#[derive(Debug)]
pub enum Error {
    /// A utility atom ([`Atom::Ignored`]) reached a value position, or an
    /// atom reached a codec that has no wire mapping for it.
    UnsupportedAtom { atom: Atom },
    /// The TLV codec requires every field to carry an externally-assigned
    /// identifier. Lists *every* offending field of the type, not just the
    /// first one found.
    MissingIdentifiers {
        type_name: &'static str,
        /// `(atom, byte offset within the type)` per unidentified field.
        fields: Vec<(Atom, usize)>,
    },
    /// The table codec saw the same object address registered twice in one
    /// write session. Aliasing detection for table output is not
    /// implemented; this diagnostic exists so the limitation fails loudly
    /// instead of corrupting the buffer.
    DuplicateOffset { type_name: &'static str },
    /// A reader without allocation capability encountered a field that
    /// needs one (a reference field, or a container transitively holding
    /// one).
    AllocationCapability { type_name: &'static str },
    /// An erased accessor or downcast was applied to a value of a foreign
    /// type. Indicates a descriptor used against the wrong object.
    TypeMismatch { expected: &'static str },
    /// A fixed-size sequence was asked to hold a different element count
    /// than its declared length.
    WrongElementCount { expected: usize, actual: usize },
    /// Truncated, out-of-range or otherwise inconsistent wire data.
    Malformed { what: &'static str },
    /// The archive already failed earlier in the session; the operation was
    /// rejected without attempting I/O.
    Poisoned,
    /// The underlying stream failed.
    Io(io::Error),
}

impl Error {
    /// Shorthand for the mismatch produced by a failed erased downcast.
    #[inline]
    pub fn type_mismatch(expected: &'static str) -> Self {
        Error::TypeMismatch { expected }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedAtom { atom } => {
                write!(f, "atom `{atom}` has no wire mapping in this context")
            }
            Self::MissingIdentifiers { type_name, fields } => {
                writeln!(
                    f,
                    "the TLV codec requires that all fields of `{type_name}` have identifiers; \
                     fields at the following offsets do not:"
                )?;
                for (atom, offset) in fields {
                    writeln!(f, "[ {atom:<8} ] @+{offset}")?;
                }
                Ok(())
            }
            Self::DuplicateOffset { type_name } => {
                write!(
                    f,
                    "attempted to register a buffer offset twice for an object of type \
                     `{type_name}`; writing one address multiple times in a session is not \
                     supported"
                )
            }
            Self::AllocationCapability { type_name } => {
                write!(
                    f,
                    "reconstructing `{type_name}` requires an allocation-capable reader"
                )
            }
            Self::TypeMismatch { expected } => {
                write!(f, "descriptor for `{expected}` applied to a foreign value")
            }
            Self::WrongElementCount { expected, actual } => {
                write!(
                    f,
                    "fixed-size sequence expects {expected} elements, got {actual}"
                )
            }
            Self::Malformed { what } => write!(f, "malformed input: {what}"),
            Self::Poisoned => f.write_str("archive is in a failed state"),
            Self::Io(err) => write!(f, "stream failure: {err}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_identifiers_lists_every_field() {
        let err = Error::MissingIdentifiers {
            type_name: "Sample",
            fields: vec![(Atom::I32, 0), (Atom::String, 8), (Atom::Bool, 32)],
        };
        let text = err.to_string();
        assert!(text.contains("`Sample`"));
        assert!(text.contains("@+0"));
        assert!(text.contains("@+8"));
        assert!(text.contains("@+32"));
    }

    #[test]
    fn io_source_is_preserved() {
        use std::error::Error as _;
        let err = Error::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(err.source().is_some());
    }
}
