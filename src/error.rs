//! Error taxonomy (spec §7): format errors, unsupported-input errors, I/O
//! errors and programmer errors all live in one flat enum, the way the
//! teacher crate's `error.rs` keeps a single `VPackError` rather than a tree
//! of error types. `core::fmt::Display` is hand-written so the crate stays
//! usable without `std`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // --- Format errors ---
    /// A varint's leading byte was `0x00`, or a value ran past the 8-byte width cap.
    InvalidVarInt,
    /// An ID varuint decoded to the reserved "invalid ID" sentinel.
    InvalidId,
    /// A `CF_ARMORED | CF_WITH_SIZE` container hit its declared count without
    /// seeing an end-of-children marker.
    MissingEndOfChildren,
    /// An end-of-children marker arrived in a non-armored container, or an
    /// armored container closed before its declared count was reached.
    UnexpectedEndOfChildren,
    /// A container declared neither `CF_WITH_SIZE` nor `CF_ARMORED`.
    IllegalCombinationOfFlags,
    /// The trailing digest length exceeded the safety cap, or didn't match
    /// the selected hash function's output length.
    MalformedHash,

    // --- Unsupported-input errors ---
    /// The tag has no registered constructor and is not an APPBLOB-range tag
    /// forgiven under `UnknownAppblobs`.
    UnsupportedRecordType,
    /// An unknown container flag bit was set and `UnknownContainerFlags`
    /// forgiveness was not requested.
    UnsupportedContainerFlags,
    /// `CF_HASHED` named a hash-function tag absent from the hash registry.
    UnsupportedHashFunction,
    /// The computed digest didn't match the one on the wire.
    HashCheckError,

    // --- I/O errors ---
    /// The underlying source produced fewer bytes than requested.
    EndOfStream,
    /// The underlying source or sink reported a failure.
    Io,

    // --- Programmer errors ---
    /// An operation that requires an open decoder/encoder was called after
    /// `close()`/a failure.
    AlreadyClosed,
    /// `start_container` was called twice without an intervening `end_container`
    /// where the API requires single-shot use.
    AlreadyOpen,
    /// `NestingSink::nest` was called outside the `Plain`-state
    /// `start_container` handler.
    NestMisuse,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidVarInt => write!(f, "invalid varint encoding"),
            Self::InvalidId => write!(f, "invalid object id (sentinel value)"),
            Self::MissingEndOfChildren => {
                write!(f, "armored container reached its declared count without an end-of-children marker")
            }
            Self::UnexpectedEndOfChildren => write!(f, "unexpected end-of-children marker"),
            Self::IllegalCombinationOfFlags => {
                write!(f, "container has neither CF_WITH_SIZE nor CF_ARMORED")
            }
            Self::MalformedHash => write!(f, "malformed trailing digest"),
            Self::UnsupportedRecordType => write!(f, "unsupported record type"),
            Self::UnsupportedContainerFlags => write!(f, "unsupported container flags"),
            Self::UnsupportedHashFunction => write!(f, "unsupported hash function"),
            Self::HashCheckError => write!(f, "container digest mismatch"),
            Self::EndOfStream => write!(f, "end of stream reached while more data was expected"),
            Self::Io => write!(f, "underlying byte source/sink failed"),
            Self::AlreadyClosed => write!(f, "operation not allowed on a closed decoder/encoder"),
            Self::AlreadyOpen => write!(f, "operation not allowed while already open"),
            Self::NestMisuse => write!(f, "nest() called outside a start_container handler"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
