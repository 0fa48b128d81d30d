use indexmap::IndexMap;
use log::warn;

/// Outcome of a [`NameTable::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<'a, T> {
  /// The key resolved to exactly one entry. Carries the stored key and its value.
  Found(&'a str, &'a T),

  /// The key is only a prefix, and more than one entry matches it. Carries every candidate key
  /// in insertion order.
  Ambiguous(Vec<&'a str>),

  /// Nothing matches the key.
  NotFound,
}
impl<'a, T> Lookup<'a, T> {
  /// The resolved value, if the lookup was unambiguous.
  pub fn found(&self) -> Option<&'a T> {
    match self {
      Lookup::Found(_, v) => Some(*v),
      _ => None,
    }
  }
}

/// Ordered associative container keyed by name, with case-insensitive and prefix lookup.
///
/// Every level of a device model (peripherals, clusters, registers, fields) keeps its children in
/// a `NameTable`. Iteration follows insertion order, which is document order.
#[derive(Debug, Clone, PartialEq)]
pub struct NameTable<T> {
  entries: IndexMap<String, T>,
  case_map: IndexMap<String, String>,
}
impl<T> Default for NameTable<T> {
  fn default() -> Self {
    Self {
      entries: IndexMap::new(),
      case_map: IndexMap::new(),
    }
  }
}
impl<T> NameTable<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stores `value` under `key`.
  ///
  /// A duplicate key, or a key that differs from an existing one only in case, is reported with
  /// a warning and stored anyway. The exact entry is replaced, but case-insensitive lookup keeps
  /// resolving to whichever key first claimed that lowercase form.
  pub fn insert<K: Into<String>>(&mut self, key: K, value: T) {
    let key = key.into();
    let lower = key.to_lowercase();

    if self.entries.contains_key(&key) {
      warn!("Duplicate entry {}", key);
    } else if let Some(existing) = self.case_map.get(&lower) {
      warn!(
        "Entry {} differs from duplicate {} only in case",
        key, existing
      );
    }

    self.case_map.entry(lower).or_insert_with(|| key.clone());
    self.entries.insert(key, value);
  }

  /// Replaces the entry stored under exactly `key`, or inserts it when there is none. Unlike
  /// [`insert`](Self::insert) an existing entry is overridden silently.
  pub(crate) fn upsert(&mut self, key: &str, value: T) {
    match self.entries.get_mut(key) {
      Some(existing) => *existing = value,
      None => self.insert(key, value),
    }
  }

  pub fn get_exact(&self, key: &str) -> Option<&T> {
    self.entries.get(key)
  }

  pub fn get_exact_mut(&mut self, key: &str) -> Option<&mut T> {
    self.entries.get_mut(key)
  }

  /// Looks `key` up exactly, then ignoring case.
  pub fn get_case_insensitive(&self, key: &str) -> Option<&T> {
    self
      .entries
      .get(key)
      .or_else(|| self.case_map_key(key).and_then(|k| self.entries.get(k)))
  }

  /// The first entry, in insertion order, that `key` prefix-matches.
  pub fn get_prefix(&self, key: &str) -> Option<&T> {
    self
      .prefix_candidates(key)
      .first()
      .and_then(|k| self.entries.get(*k))
  }

  /// Looks `key` up exactly, then ignoring case, then by prefix. An ambiguous prefix resolves to
  /// its first candidate; use [`lookup`](Self::lookup) to detect that.
  pub fn get(&self, key: &str) -> Option<&T> {
    self.get_case_insensitive(key).or_else(|| self.get_prefix(key))
  }

  /// Like [`get`](Self::get), but reports an ambiguous prefix instead of picking a candidate.
  pub fn lookup(&self, key: &str) -> Lookup<'_, T> {
    if let Some((k, v)) = self.entries.get_key_value(key) {
      return Lookup::Found(k.as_str(), v);
    }

    if let Some((k, v)) = self
      .case_map_key(key)
      .and_then(|k| self.entries.get_key_value(k))
    {
      return Lookup::Found(k.as_str(), v);
    }

    let mut candidates = self.prefix_candidates(key);
    match candidates.len() {
      0 => Lookup::NotFound,
      1 => {
        let k = candidates.remove(0);
        match self.entries.get_key_value(k) {
          Some((k, v)) => Lookup::Found(k.as_str(), v),
          None => Lookup::NotFound,
        }
      }
      _ => Lookup::Ambiguous(candidates),
    }
  }

  /// Keys matched by `key` used as a prefix.
  ///
  /// The lowercased key is split into a head and a trailing run of digits. A stored key matches
  /// when its lowercase form starts with the head and ends with the digits, so `UART` matches
  /// `UART1` and `UART12` but not `USART1`, and `UART2` matches `UART_CH2`.
  pub fn prefix_candidates(&self, key: &str) -> Vec<&str> {
    let (head, digits) = split_numeric_suffix(&key.to_lowercase());

    self
      .case_map
      .iter()
      .filter(|(lower, _)| lower.starts_with(&head) && lower.ends_with(&digits))
      .map(|(_, k)| k.as_str())
      .collect()
  }

  /// Whether `key` resolves to anything, exactly, ignoring case, or as a prefix.
  pub fn contains(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  /// True when `key` is neither an exact nor a case-insensitive hit and matches more than one
  /// entry as a prefix.
  pub fn is_ambiguous(&self, key: &str) -> bool {
    !self.entries.contains_key(key)
      && self.case_map_key(key).is_none()
      && self.prefix_candidates(key).len() > 1
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(|k| k.as_str())
  }

  pub fn values(&self) -> impl Iterator<Item = &T> {
    self.entries.values()
  }

  pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
    self.entries.values_mut()
  }

  fn case_map_key(&self, key: &str) -> Option<&String> {
    self.case_map.get(&key.to_lowercase())
  }
}

fn split_numeric_suffix(key: &str) -> (String, String) {
  let head = key.trim_end_matches(|c: char| c.is_ascii_digit());
  (head.to_owned(), key[head.len()..].to_owned())
}

#[cfg(test)]
mod tests {
  use super::{Lookup, NameTable};

  fn table(keys: &[&str]) -> NameTable<usize> {
    let mut t = NameTable::new();
    for (n, k) in keys.iter().enumerate() {
      t.insert(*k, n);
    }
    t
  }

  #[test]
  fn looks_up_ignoring_case() {
    let t = table(&["UART1"]);

    assert_eq!(Some(&0), t.get_exact("UART1"));
    assert_eq!(None, t.get_exact("uart1"));
    assert_eq!(Some(&0), t.get_case_insensitive("uart1"));
    assert_eq!(Some(&0), t.get_case_insensitive("Uart1"));
  }

  #[test]
  fn matches_prefix_with_numeric_suffix() {
    let t = table(&["UART1", "USART1", "UART12", "SPI1"]);

    assert_eq!(vec!["UART1", "UART12"], t.prefix_candidates("UART"));
    assert_eq!(vec!["UART1", "USART1"], t.prefix_candidates("U1"));
    assert_eq!(vec!["UART12"], t.prefix_candidates("uart12"));
    assert_eq!(Some(&3), t.get_prefix("sp"));
    assert_eq!(None, t.get_prefix("I2C"));
  }

  #[test]
  fn reports_ambiguous_prefix() {
    let t = table(&["UART1", "UART2", "UART10"]);

    assert!(t.is_ambiguous("UART"));
    assert_eq!(
      Lookup::Ambiguous(vec!["UART1", "UART2", "UART10"]),
      t.lookup("UART")
    );

    assert!(!t.is_ambiguous("UART1"));
    assert_eq!(Lookup::Found("UART1", &0), t.lookup("UART1"));
    assert_eq!(Lookup::Found("UART10", &2), t.lookup("uart10"));
  }

  #[test]
  fn ambiguous_prefix_resolves_to_first_when_not_checked() {
    let t = table(&["UART1", "UART2"]);

    assert_eq!(2, t.prefix_candidates("UART").len());
    assert_eq!(Some(&0), t.get_prefix("UART"));
    assert_eq!(Some(&0), t.get("UART"));
  }

  #[test]
  fn unique_prefix_is_found() {
    let t = table(&["CR1", "SR", "DR"]);

    assert_eq!(Lookup::Found("SR", &1), t.lookup("s"));
    assert_eq!(Lookup::NotFound, t.lookup("X"));
    assert!(t.contains("d"));
    assert!(!t.contains("X"));
  }

  #[test]
  fn duplicate_key_is_overwritten() {
    let mut t = table(&["CR1"]);
    t.insert("CR1", 7);

    assert_eq!(1, t.len());
    assert_eq!(Some(&7), t.get_exact("CR1"));
  }

  #[test]
  fn case_only_collision_keeps_first_case_mapping() {
    let mut t = table(&["Ctrl"]);
    t.insert("CTRL", 1);

    assert_eq!(2, t.len());
    assert_eq!(Some(&0), t.get_exact("Ctrl"));
    assert_eq!(Some(&1), t.get_exact("CTRL"));
    assert_eq!(Some(&0), t.get_case_insensitive("ctrl"));
    assert_eq!(vec!["Ctrl"], t.prefix_candidates("ct"));
  }

  #[test]
  fn iterates_in_insertion_order() {
    let t = table(&["ZED", "ALPHA", "MID"]);

    assert_eq!(
      vec!["ZED", "ALPHA", "MID"],
      t.keys().collect::<Vec<&str>>()
    );
    assert_eq!(vec![0, 1, 2], t.values().cloned().collect::<Vec<usize>>());
  }

  #[test]
  fn upsert_replaces_silently() {
    let mut t = table(&["A", "B"]);
    t.upsert("A", 9);
    t.upsert("C", 3);

    assert_eq!(vec![("A", &9), ("B", &1), ("C", &3)], t.iter().collect::<Vec<_>>());
  }
}
