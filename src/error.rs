use log::warn;
use std::{error::Error, fmt};

/// Convenience type for a result that may contain an `SvdError`.
pub type SvdResult<T> = std::result::Result<T, SvdError>;

/// Kind of element named in an unresolved `derivedFrom` reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementKind {
  Peripheral,
  Cluster,
  Register,
}
impl fmt::Display for ElementKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      ElementKind::Peripheral => write!(f, "peripheral"),
      ElementKind::Cluster => write!(f, "cluster"),
      ElementKind::Register => write!(f, "register"),
    }
  }
}

/// Error enum for everything that can go wrong while building or querying a device model.
///
/// Some of these abort the whole load and some only cost the element being built; see
/// [`SvdError::is_fatal`].
#[derive(Debug, Clone, PartialEq)]
pub enum SvdError {
  /// The document is not shaped like a device description (no root `device`, no `peripherals`).
  Structural(String),

  /// The document is not well-formed XML.
  Xml(String),

  /// The document could not be read.
  Io(String),

  /// A peripheral has no `baseAddress`.
  MissingBaseAddress { peripheral: String },

  /// A `derivedFrom` reference names something that has not been built (yet).
  UnresolvedDerivation {
    kind: ElementKind,
    name: String,
    derived_from: String,
  },

  /// A field carries none of `bitOffset`/`bitWidth`, `bitRange` or `lsb`/`msb`.
  MissingBitRange { field: String },

  /// A field bit range is malformed, empty, or does not fit in its register.
  InvalidBitRange { field: String, details: String },

  /// A mandatory child element is absent.
  MissingElement { element: String, tag: String },

  /// A numeric child element could not be parsed.
  InvalidNumber {
    element: String,
    tag: String,
    text: String,
  },

  /// A value does not fit in the bit width of the field it is written to.
  ValueOutOfRange {
    field: String,
    value: u64,
    width: u32,
  },
}
impl SvdError {
  /// Whether this error aborts the whole document load rather than only the element that raised
  /// it.
  pub fn is_fatal(&self) -> bool {
    match self {
      SvdError::Structural(_)
      | SvdError::Xml(_)
      | SvdError::Io(_)
      | SvdError::UnresolvedDerivation { .. } => true,
      _ => false,
    }
  }

  pub(crate) fn structural(msg: &str) -> SvdError {
    SvdError::Structural(msg.to_string())
  }

  pub(crate) fn missing(element: &str, tag: &str) -> SvdError {
    SvdError::MissingElement {
      element: element.to_string(),
      tag: tag.to_string(),
    }
  }

  pub(crate) fn invalid_bit_range(field: &str, details: &str) -> SvdError {
    SvdError::InvalidBitRange {
      field: field.to_string(),
      details: details.to_string(),
    }
  }
}

/// Catch-and-continue boundary for one element of the document. A non-fatal error is logged and
/// turned into an empty result so the element's siblings still load; a fatal error is passed on.
pub(crate) fn isolate<T>(result: SvdResult<Vec<T>>, what: &str) -> SvdResult<Vec<T>> {
  match result {
    Err(ref e) if !e.is_fatal() => {
      warn!("Skipping {}: {}", what, e);
      Ok(Vec::new())
    }
    other => other,
  }
}

impl fmt::Display for SvdError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      SvdError::Structural(details) => write!(f, "Malformed device description: {}", details),
      SvdError::Xml(details) => write!(f, "XML error: {}", details),
      SvdError::Io(details) => write!(f, "I/O error: {}", details),
      SvdError::MissingBaseAddress { peripheral } => {
        write!(f, "Peripheral {} has no base address", peripheral)
      }
      SvdError::UnresolvedDerivation {
        kind,
        name,
        derived_from,
      } => write!(
        f,
        "{} {} is derived from '{}', which is not defined before it",
        kind, name, derived_from
      ),
      SvdError::MissingBitRange { field } => write!(f, "Field {}: no bit range found", field),
      SvdError::InvalidBitRange { field, details } => {
        write!(f, "Field {}: invalid bit range: {}", field, details)
      }
      SvdError::MissingElement { element, tag } => {
        write!(f, "{}: missing '{}' element", element, tag)
      }
      SvdError::InvalidNumber { element, tag, text } => {
        write!(f, "{}: '{}' is not a valid number for '{}'", element, text, tag)
      }
      SvdError::ValueOutOfRange {
        field,
        value,
        width,
      } => write!(
        f,
        "{} is not a valid value for field {} with width {}",
        value, field, width
      ),
    }
  }
}
impl Error for SvdError {}
impl From<std::io::Error> for SvdError {
  fn from(err: std::io::Error) -> Self {
    SvdError::Io(err.to_string())
  }
}
impl From<regex::Error> for SvdError {
  fn from(err: regex::Error) -> Self {
    SvdError::Structural(format!("regex::Error {:?}", err))
  }
}
impl From<xmltree::ParseError> for SvdError {
  fn from(err: xmltree::ParseError) -> Self {
    SvdError::Xml(err.to_string())
  }
}
