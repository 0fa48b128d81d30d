use std::convert::TryFrom;

use xmltree::{Element, XMLNode};

use crate::error::{SvdError, SvdResult};

/// Direct children of `el` named `tag`, in document order.
pub(crate) fn children<'a>(el: &'a Element, tag: &'a str) -> impl Iterator<Item = &'a Element> {
  el.children.iter().filter_map(move |node| match node {
    XMLNode::Element(ref child) if child.name == tag => Some(child),
    _ => None,
  })
}

/// Direct children of `el` named `register` or `cluster`, in document order.
pub(crate) fn register_cluster_children(el: &Element) -> impl Iterator<Item = &Element> {
  el.children.iter().filter_map(|node| match node {
    XMLNode::Element(ref child) if child.name == "register" || child.name == "cluster" => {
      Some(child)
    }
    _ => None,
  })
}

/// Trimmed text of the child `tag`. Absent and blank children both yield `None`.
pub(crate) fn child_text(el: &Element, tag: &str) -> Option<String> {
  el.get_child(tag)
    .and_then(|c| c.get_text())
    .map(|t| t.trim().to_owned())
    .filter(|t| !t.is_empty())
}

/// Text of the child `tag` with runs of whitespace (including line breaks) collapsed to a single
/// space.
pub(crate) fn child_text_clean(el: &Element, tag: &str) -> Option<String> {
  child_text(el, tag).map(|t| t.split_whitespace().collect::<Vec<&str>>().join(" "))
}

pub(crate) fn attribute(el: &Element, name: &str) -> Option<String> {
  el.attributes
    .get(name)
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

pub(crate) fn child_u64(el: &Element, tag: &str, context: &str) -> SvdResult<Option<u64>> {
  match child_text(el, tag) {
    Some(text) => match parse_int(&text) {
      Some(v) => Ok(Some(v)),
      None => Err(SvdError::InvalidNumber {
        element: context.to_owned(),
        tag: tag.to_owned(),
        text,
      }),
    },
    None => Ok(None),
  }
}

pub(crate) fn child_u32(el: &Element, tag: &str, context: &str) -> SvdResult<Option<u32>> {
  match child_u64(el, tag, context)? {
    Some(v) => match u32::try_from(v) {
      Ok(v) => Ok(Some(v)),
      Err(_) => Err(SvdError::InvalidNumber {
        element: context.to_owned(),
        tag: tag.to_owned(),
        text: v.to_string(),
      }),
    },
    None => Ok(None),
  }
}

pub(crate) fn required_u32(el: &Element, tag: &str, context: &str) -> SvdResult<u32> {
  match child_u32(el, tag, context)? {
    Some(v) => Ok(v),
    None => Err(SvdError::missing(context, tag)),
  }
}

/// Parses an integer literal: decimal, or hexadecimal/binary/octal with a `0x`/`0b`/`0o` prefix.
/// Underscores between digits are accepted.
pub fn parse_int(text: &str) -> Option<u64> {
  let text = text.trim();
  let lower = text.to_lowercase();

  let (digits, radix) = if let Some(rest) = strip(&lower, "0x") {
    (rest, 16)
  } else if let Some(rest) = strip(&lower, "0b") {
    (rest, 2)
  } else if let Some(rest) = strip(&lower, "0o") {
    (rest, 8)
  } else {
    (lower.as_str(), 10)
  };

  if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') {
    return None;
  }

  let digits: String = digits.chars().filter(|c| *c != '_').collect();
  u64::from_str_radix(&digits, radix).ok()
}

/// Parses the literal of an enumerated value. A leading `#` marks a binary literal; anything else
/// goes through [`parse_int`]. Literals that are not one definite integer, such as binary values
/// with `x` don't-care bits, yield `None`.
pub fn parse_enum_literal(text: &str) -> Option<u64> {
  let text = text.trim();
  match strip(text, "#") {
    Some(bits) if !bits.is_empty() => u64::from_str_radix(bits, 2).ok(),
    Some(_) => None,
    None => parse_int(text),
  }
}

fn strip<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
  if text.starts_with(prefix) {
    Some(&text[prefix.len()..])
  } else {
    None
  }
}
