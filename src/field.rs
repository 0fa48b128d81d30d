use std::{collections::BTreeMap, sync::OnceLock};

use log::info;
use regex::Regex;
use xmltree::Element;

use super::AccessSpec;
use crate::{
  access_of,
  dim::{substitute, DimSpec},
  error::{SvdError, SvdResult},
  xml::{child_text, child_text_clean, children, parse_enum_literal, parse_int},
};

/// A symbolic name for one value a field may hold.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumeratedValueSpec {
  pub name: String,
  pub description: Option<String>,
  pub value: u64,
}

/// What a field needs to know about the register it is built for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldContext<'a> {
  pub register: &'a str,
  pub size: u32,
  pub access: AccessSpec,
  pub reset_value: Option<u64>,
}

/// Describes a field on a register.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
  /// A name that identifies the field. Should be unique within the parent register.
  pub name: String,

  /// Description of the field's usage, purpose, and/or operation.
  pub description: Option<String>,

  /// The position of the least-significant bit of this field within its register.
  pub bit_offset: u32,

  /// The bit width of the field.
  pub bit_width: u32,

  /// The access rights to the field. Falls back to the register's when the field has none.
  pub access: AccessSpec,

  /// Symbolic names of the values this field may hold, keyed by value.
  pub enumerated_values: BTreeMap<u64, EnumeratedValueSpec>,

  /// The value of the field after reset, when the register has a reset value.
  pub reset_value: Option<u64>,
}
impl FieldSpec {
  /// Builds the field (or fields, for a `dim` array) described by `el`.
  pub(crate) fn build(el: &Element, register: &FieldContext) -> SvdResult<Vec<Self>> {
    let name = match child_text(el, "name") {
      Some(n) => n,
      None => {
        return Err(SvdError::missing(
          &format!("field in register {}", register.register),
          "name",
        ))
      }
    };
    let context = format!("field {}.{}", register.register, name);

    let (bit_offset, bit_width) = bit_range(el, &name)?;

    let prototype = Self {
      description: child_text_clean(el, "description"),
      bit_offset,
      bit_width,
      access: access_of(el, &context).unwrap_or(register.access),
      enumerated_values: enumerated_values(el, &context),
      reset_value: None,
      name,
    };

    let specs = match DimSpec::from_element(el, &context)? {
      None => vec![prototype],
      Some(dim) => dim
        .offsets()
        .map(|(index, offset)| {
          let bit_offset = match prototype.bit_offset.checked_add(offset) {
            Some(b) => b,
            None => {
              return Err(SvdError::invalid_bit_range(
                &prototype.name,
                "array element offset overflows",
              ))
            }
          };
          let mut spec = prototype.clone();
          spec.interpolate_array_params(index, bit_offset);
          Ok(spec)
        })
        .collect::<SvdResult<Vec<Self>>>()?,
    };

    specs
      .into_iter()
      .map(|mut spec| {
        spec.fit_to(register.size, register.reset_value)?;
        Ok(spec)
      })
      .collect()
  }

  /// Checks the field against the size of its register and recomputes its reset value from the
  /// register's.
  pub(crate) fn fit_to(&mut self, register_size: u32, reset_value: Option<u64>) -> SvdResult<()> {
    self.check_fits(register_size)?;
    self.reset_value = reset_value.map(|rv| self.extract(rv));
    Ok(())
  }

  pub fn readable(&self) -> bool {
    self.access.readable()
  }

  pub fn writable(&self) -> bool {
    self.access.writable()
  }

  /// The bit mask for reading/writing this field on the parent register
  pub fn mask(&self) -> u64 {
    self.value_mask().checked_shl(self.bit_offset).unwrap_or(0)
  }

  /// The value of this field within the register value `raw`.
  pub fn extract(&self, raw: u64) -> u64 {
    (raw & self.mask()).checked_shr(self.bit_offset).unwrap_or(0)
  }

  /// Returns `raw` with this field replaced by `value`. Fails if `value` does not fit in the
  /// field.
  pub fn insert(&self, raw: u64, value: u64) -> SvdResult<u64> {
    if value > self.value_mask() {
      return Err(SvdError::ValueOutOfRange {
        field: self.name.clone(),
        value,
        width: self.bit_width,
      });
    }

    Ok((raw & !self.mask()) | (value.checked_shl(self.bit_offset).unwrap_or(0)))
  }

  /// The enumerated value with the given field value, if there is one.
  pub fn decode(&self, value: u64) -> Option<&EnumeratedValueSpec> {
    self.enumerated_values.get(&value)
  }

  /// The field value of the enumerated value called `name`, ignoring case.
  pub fn encode(&self, name: &str) -> Option<u64> {
    self
      .enumerated_values
      .values()
      .find(|ev| ev.name.eq_ignore_ascii_case(name))
      .map(|ev| ev.value)
  }

  fn value_mask(&self) -> u64 {
    if self.bit_width >= 64 {
      u64::MAX
    } else {
      (1u64 << self.bit_width) - 1
    }
  }

  fn check_fits(&self, register_size: u32) -> SvdResult<()> {
    if self.bit_width == 0 {
      return Err(SvdError::invalid_bit_range(&self.name, "width is zero"));
    }

    if self.bit_offset as u64 + self.bit_width as u64 > register_size as u64 {
      return Err(SvdError::invalid_bit_range(
        &self.name,
        &format!(
          "bits {}..{} do not fit in a {}-bit register",
          self.bit_offset,
          self.bit_offset as u64 + self.bit_width as u64,
          register_size
        ),
      ));
    }

    Ok(())
  }

  fn interpolate_array_params(&mut self, index: &str, bit_offset: u32) {
    self.name = substitute(&self.name, index);

    if let Some(desc) = self.description.clone() {
      self.description = Some(substitute(&desc, index));
    }

    self.bit_offset = bit_offset;
  }
}

/// Resolves the bit range of a field from `bitOffset`/`bitWidth`, then `bitRange`, then
/// `lsb`/`msb`. Returns `(bit_offset, bit_width)`.
fn bit_range(el: &Element, field: &str) -> SvdResult<(u32, u32)> {
  if let (Some(offset), Some(width)) = (child_text(el, "bitOffset"), child_text(el, "bitWidth")) {
    return Ok((bit_number(field, &offset)?, bit_number(field, &width)?));
  }

  if let Some(range) = child_text(el, "bitRange") {
    return match bit_range_pattern()?.captures(&range) {
      Some(caps) => lsb_msb(field, bit_number(field, &caps[2])?, bit_number(field, &caps[1])?),
      None => Err(SvdError::invalid_bit_range(
        field,
        &format!("'{}' is not of the form [msb:lsb]", range),
      )),
    };
  }

  if let (Some(lsb), Some(msb)) = (child_text(el, "lsb"), child_text(el, "msb")) {
    return lsb_msb(field, bit_number(field, &lsb)?, bit_number(field, &msb)?);
  }

  Err(SvdError::MissingBitRange {
    field: field.to_owned(),
  })
}

fn bit_range_pattern() -> SvdResult<&'static Regex> {
  static PATTERN: OnceLock<Regex> = OnceLock::new();

  if let Some(re) = PATTERN.get() {
    return Ok(re);
  }
  let re = Regex::new(r"^\[\s*(\w+)\s*:\s*(\w+)\s*\]$")?;
  Ok(PATTERN.get_or_init(|| re))
}

fn lsb_msb(field: &str, lsb: u32, msb: u32) -> SvdResult<(u32, u32)> {
  if msb < lsb {
    return Err(SvdError::invalid_bit_range(
      field,
      &format!("msb {} is below lsb {}", msb, lsb),
    ));
  }

  match (msb - lsb).checked_add(1) {
    Some(width) => Ok((lsb, width)),
    None => Err(SvdError::invalid_bit_range(
      field,
      &format!("bits {}..={} are too wide", lsb, msb),
    )),
  }
}

fn bit_number(field: &str, text: &str) -> SvdResult<u32> {
  match parse_int(text) {
    Some(v) if v <= u32::MAX as u64 => Ok(v as u32),
    _ => Err(SvdError::invalid_bit_range(
      field,
      &format!("'{}' is not a bit number", text),
    )),
  }
}

/// Collects the enumerated values of every `enumeratedValues` set on the field. Entries whose
/// value is not a single definite integer are dropped.
fn enumerated_values(el: &Element, context: &str) -> BTreeMap<u64, EnumeratedValueSpec> {
  let mut values = BTreeMap::new();

  for set in children(el, "enumeratedValues") {
    for ev in children(set, "enumeratedValue") {
      let name = child_text(ev, "name").unwrap_or_default();

      let literal = match child_text(ev, "value") {
        Some(l) => l,
        None => continue,
      };

      match parse_enum_literal(&literal) {
        Some(value) => {
          values.insert(
            value,
            EnumeratedValueSpec {
              name,
              description: child_text_clean(ev, "description"),
              value,
            },
          );
        }
        None => info!(
          "{}: dropping enumerated value {} with literal '{}'",
          context, name, literal
        ),
      }
    }
  }

  values
}
