//! Builds an address-resolved, bit-accurate model of a microcontroller's memory-mapped registers
//! from a CMSIS-SVD document, and resolves human-typed names (`UART1 > CR1 > TXEIE`) against it.
//!
//! The model is built in one pass over the document. `derivedFrom` references are resolved by
//! deep copy, `dim` arrays are expanded into independent siblings, and every register carries the
//! absolute base address of its enclosing scope. Once built, a [`DeviceSpec`] is never mutated.

use log::warn;
use xmltree::Element;

mod cluster;
mod device;
mod dim;
mod error;
mod field;
mod name_table;
mod peripheral;
mod register;
mod resolve;
mod xml;

pub use cluster::ClusterSpec;
pub use device::DeviceSpec;
pub use dim::DimSpec;
pub use error::{ElementKind, SvdError, SvdResult};
pub use field::{EnumeratedValueSpec, FieldSpec};
pub use name_table::{Lookup, NameTable};
pub use peripheral::PeripheralSpec;
pub use register::RegisterSpec;
pub use resolve::{Resolution, Target};
pub use xml::{parse_enum_literal, parse_int};

/// Register bit width used when neither the register nor any enclosing scope specifies one.
pub const DEFAULT_REGISTER_SIZE: u32 = 32;

/// Widest register the model can hold; register values are `u64`.
pub const MAX_REGISTER_SIZE: u32 = 64;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AccessSpec {
  ReadOnly,
  ReadWrite,
  ReadWriteOnce,
  WriteOnce,
  WriteOnly,
}
impl AccessSpec {
  /// Parses the access strings used by SVD documents.
  pub fn from_svd(text: &str) -> Option<AccessSpec> {
    match text.trim() {
      "read-only" => Some(AccessSpec::ReadOnly),
      "read-write" => Some(AccessSpec::ReadWrite),
      "read-writeOnce" => Some(AccessSpec::ReadWriteOnce),
      "writeOnce" => Some(AccessSpec::WriteOnce),
      "write-only" => Some(AccessSpec::WriteOnly),
      _ => None,
    }
  }

  pub fn as_svd(&self) -> &'static str {
    match self {
      AccessSpec::ReadOnly => "read-only",
      AccessSpec::ReadWrite => "read-write",
      AccessSpec::ReadWriteOnce => "read-writeOnce",
      AccessSpec::WriteOnce => "writeOnce",
      AccessSpec::WriteOnly => "write-only",
    }
  }

  pub fn readable(&self) -> bool {
    match self {
      AccessSpec::ReadOnly | AccessSpec::ReadWrite | AccessSpec::ReadWriteOnce => true,
      _ => false,
    }
  }

  pub fn writable(&self) -> bool {
    match self {
      AccessSpec::ReadWrite
      | AccessSpec::ReadWriteOnce
      | AccessSpec::WriteOnce
      | AccessSpec::WriteOnly => true,
      _ => false,
    }
  }
}
impl Default for AccessSpec {
  fn default() -> Self {
    AccessSpec::ReadWrite
  }
}

/// Register defaults that a device, peripheral or cluster hands down to the registers it
/// contains. Each level keeps what it specifies itself and inherits the rest.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegisterProperties {
  pub size: Option<u32>,
  pub access: Option<AccessSpec>,
  pub reset_value: Option<u64>,
  pub reset_mask: Option<u64>,
}
impl RegisterProperties {
  pub(crate) fn from_element(
    el: &Element,
    context: &str,
    inherited: &RegisterProperties,
  ) -> SvdResult<Self> {
    let size = match xml::child_u32(el, "size", context)? {
      Some(size) if size == 0 || size > MAX_REGISTER_SIZE => {
        return Err(SvdError::InvalidNumber {
          element: context.to_owned(),
          tag: "size".to_owned(),
          text: size.to_string(),
        })
      }
      size => size,
    };

    Ok(Self {
      size: size.or(inherited.size),
      access: access_of(el, context).or(inherited.access),
      reset_value: xml::child_u64(el, "resetValue", context)?.or(inherited.reset_value),
      reset_mask: xml::child_u64(el, "resetMask", context)?.or(inherited.reset_mask),
    })
  }

  pub fn size_or_default(&self) -> u32 {
    self.size.unwrap_or(DEFAULT_REGISTER_SIZE)
  }

  pub fn access_or_default(&self) -> AccessSpec {
    self.access.unwrap_or_default()
  }
}

/// The `access` child of `el`. Unrecognised strings are reported and treated as absent.
pub(crate) fn access_of(el: &Element, context: &str) -> Option<AccessSpec> {
  let text = xml::child_text(el, "access")?;
  match AccessSpec::from_svd(&text) {
    Some(a) => Some(a),
    None => {
      warn!("{}: unknown access '{}', ignoring it", context, text);
      None
    }
  }
}

/// Where a register or cluster is being built: the absolute base address of the enclosing scope
/// and the register defaults it hands down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Scope {
  pub base_address: u32,
  pub properties: RegisterProperties,
}

/// `base + offset`, or `InvalidNumber` for `tag` of `context` when the sum leaves the 32-bit
/// address space.
pub(crate) fn add_offset(base: u32, offset: u32, context: &str, tag: &str) -> SvdResult<u32> {
  match base.checked_add(offset) {
    Some(address) => Ok(address),
    None => Err(SvdError::InvalidNumber {
      element: context.to_owned(),
      tag: tag.to_owned(),
      text: format!("{:#x} + {:#x}", base, offset),
    }),
  }
}
