use std::sync::OnceLock;

use log::warn;
use regex::Regex;
use xmltree::Element;

use crate::{
  error::{SvdError, SvdResult},
  xml::{child_text, child_u32, required_u32},
};

/// Array parameters (`dim`, `dimIncrement`, `dimIndex`) of an element that expands into several
/// same-shaped siblings.
#[derive(Debug, Clone, PartialEq)]
pub struct DimSpec {
  /// Number of elements in the array.
  pub dim: u32,

  /// Distance between consecutive elements, in address units (or bits, for fields).
  pub dim_increment: u32,

  /// The tokens substituted into the name of each element.
  pub indices: Vec<String>,
}
impl DimSpec {
  /// Reads the array parameters of `el`, or `None` when it is not an array.
  pub(crate) fn from_element(el: &Element, context: &str) -> SvdResult<Option<Self>> {
    let dim = match child_u32(el, "dim", context)? {
      Some(dim) => dim,
      None => return Ok(None),
    };
    let dim_increment = required_u32(el, "dimIncrement", context)?;

    let indices = match child_text(el, "dimIndex") {
      Some(di) => {
        let indices = parse_dim_index(&di)?;
        if indices.len() != dim as usize {
          warn!(
            "{}: 'dim' is {} but 'dimIndex' lists {} entries; using 'dimIndex'",
            context,
            dim,
            indices.len()
          );
        }
        check_extent(indices.len(), dim_increment, context)?;
        indices
      }
      None => {
        check_extent(dim as usize, dim_increment, context)?;
        (0..dim).map(|v| v.to_string()).collect()
      }
    };

    Ok(Some(Self {
      dim,
      dim_increment,
      indices,
    }))
  }

  /// Each index token paired with the offset of its element from the first one.
  pub fn offsets(&self) -> impl Iterator<Item = (&str, u32)> {
    let increment = self.dim_increment;
    self
      .indices
      .iter()
      .enumerate()
      .map(move |(n, index)| (index.as_str(), n as u32 * increment))
  }
}

/// Substitutes `index` into a name or description template. Both `%s` and the bracketed array
/// form `[%s]` are recognised.
pub(crate) fn substitute(template: &str, index: &str) -> String {
  if template.contains("[%s]") {
    template.replace("[%s]", index)
  } else {
    template.replace("%s", index)
  }
}

/// Parses a `dimIndex` value: a comma separated list (`A,B,C`), a numeric range (`3-6`), or a
/// letter range (`A-D`).
pub(crate) fn parse_dim_index(text: &str) -> SvdResult<Vec<String>> {
  if let Some(caps) = index_range_pattern()?.captures(text) {
    if let (Some(start), Some(end)) = (caps.get(1), caps.get(2)) {
      let start: u32 = start.as_str().parse().map_err(|_| invalid_index(text))?;
      let end: u32 = end.as_str().parse().map_err(|_| invalid_index(text))?;
      return Ok((start..=end).map(|v| v.to_string()).collect());
    }
    if let (Some(start), Some(end)) = (caps.get(3), caps.get(4)) {
      let start = start.as_str().as_bytes()[0];
      let end = end.as_str().as_bytes()[0];
      return Ok((start..=end).map(|c| (c as char).to_string()).collect());
    }
  }

  Ok(
    text
      .split(',')
      .map(|s| s.trim().to_owned())
      .filter(|s| !s.is_empty())
      .collect(),
  )
}

/// Fails when the last of `count` elements would sit beyond the 32-bit address space.
fn check_extent(count: usize, dim_increment: u32, context: &str) -> SvdResult<()> {
  let extent = (count.saturating_sub(1) as u64).saturating_mul(dim_increment as u64);
  if extent > u32::MAX as u64 {
    return Err(SvdError::InvalidNumber {
      element: context.to_owned(),
      tag: "dimIncrement".to_owned(),
      text: format!("{} elements of {:#x}", count, dim_increment),
    });
  }

  Ok(())
}

fn index_range_pattern() -> SvdResult<&'static Regex> {
  static PATTERN: OnceLock<Regex> = OnceLock::new();

  if let Some(re) = PATTERN.get() {
    return Ok(re);
  }
  let re = Regex::new(r"^\s*(?:([0-9]+)-([0-9]+)|([A-Z])-([A-Z]))\s*$")?;
  Ok(PATTERN.get_or_init(|| re))
}

fn invalid_index(text: &str) -> SvdError {
  SvdError::InvalidNumber {
    element: "dimIndex".to_owned(),
    tag: "dimIndex".to_owned(),
    text: text.to_owned(),
  }
}
