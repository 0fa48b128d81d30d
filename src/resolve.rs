use super::{ClusterSpec, DeviceSpec, FieldSpec, PeripheralSpec, RegisterSpec};
use crate::name_table::{Lookup, NameTable};

/// An element of the model that a name resolved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target<'a> {
  Peripheral(&'a PeripheralSpec),
  Cluster(&'a ClusterSpec),
  Register(&'a RegisterSpec),
  Field {
    register: &'a RegisterSpec,
    field: &'a FieldSpec,
  },
}
impl<'a> Target<'a> {
  /// The absolute address of the target. For a field, the address of its register.
  pub fn address(&self) -> u32 {
    match self {
      Target::Peripheral(p) => p.address(),
      Target::Cluster(c) => c.address(),
      Target::Register(r) => r.address(),
      Target::Field { register, .. } => register.address(),
    }
  }

  /// `(bit_offset, bit_width)` of a field target.
  pub fn bit_range(&self) -> Option<(u32, u32)> {
    match self {
      Target::Field { field, .. } => Some((field.bit_offset, field.bit_width)),
      _ => None,
    }
  }
}

/// Outcome of [`DeviceSpec::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
  /// Every segment resolved. `path` spells the target with its real names, separated by `.`.
  Found { path: String, target: Target<'a> },

  /// `segment` is a prefix of more than one name at its level.
  Ambiguous {
    segment: String,
    candidates: Vec<String>,
  },

  /// Nothing at its level matches `segment`.
  NotFound { segment: String },
}
impl<'a> Resolution<'a> {
  pub fn target(&self) -> Option<Target<'a>> {
    match self {
      Resolution::Found { target, .. } => Some(*target),
      _ => None,
    }
  }
}

impl DeviceSpec {
  /// Resolves a human-typed path such as `UART1 > CR1 > TXEIE`, `uart1.cr1.txe` or
  /// `TIM1/CH1/CCR`. Segments are separated by whitespace, `>`, `.` or `/`. Each segment is
  /// matched exactly, then ignoring case, then as a unique prefix.
  pub fn resolve(&self, path: &str) -> Resolution<'_> {
    let segments: Vec<&str> = path
      .split(|c: char| c.is_whitespace() || c == '>' || c == '.' || c == '/')
      .filter(|s| !s.is_empty())
      .collect();

    let (first, rest) = match segments.split_first() {
      Some(split) => split,
      None => {
        return Resolution::NotFound {
          segment: String::new(),
        }
      }
    };

    let (name, peripheral) = match self.peripherals.lookup(first) {
      Lookup::Found(name, p) => (name, p),
      other => return unresolved(first, other),
    };

    let mut resolved = vec![name.to_owned()];
    let mut target = Target::Peripheral(peripheral);

    for segment in rest {
      target = match target {
        Target::Peripheral(p) => {
          match member(&p.registers, &p.clusters, segment) {
            Ok(t) => t,
            Err(r) => return r,
          }
        }
        Target::Cluster(c) => match member(&c.registers, &c.clusters, segment) {
          Ok(t) => t,
          Err(r) => return r,
        },
        Target::Register(register) => match register.fields.lookup(segment) {
          Lookup::Found(_, field) => Target::Field { register, field },
          other => return unresolved(segment, other),
        },
        Target::Field { .. } => {
          return Resolution::NotFound {
            segment: segment.to_string(),
          }
        }
      };

      resolved.push(match target {
        Target::Peripheral(p) => p.name.clone(),
        Target::Cluster(c) => c.name.clone(),
        Target::Register(r) => r.name.clone(),
        Target::Field { field, .. } => field.name.clone(),
      });
    }

    Resolution::Found {
      path: resolved.join("."),
      target,
    }
  }

  /// The register at the absolute `address`, with its full path (`PERIPHERAL.CLUSTER.REGISTER`).
  /// Peripherals are searched in document order.
  pub fn register_at(&self, address: u32) -> Option<(String, &RegisterSpec)> {
    self.peripherals.values().find_map(|p| {
      p.registers_by_address()
        .into_iter()
        .find(|(_, r)| r.address() == address)
        .map(|(path, r)| (format!("{}.{}", p.name, path), r))
    })
  }

  /// The field covering `bit` of the register at `address`, with its full path.
  pub fn field_at(&self, address: u32, bit: u32) -> Option<(String, &FieldSpec)> {
    let (path, register) = self.register_at(address)?;
    register
      .fields
      .values()
      .find(|f| bit >= f.bit_offset && bit - f.bit_offset < f.bit_width)
      .map(|f| (format!("{}.{}", path, f.name), f))
  }
}

/// Looks `segment` up among the registers and clusters of one container. Exact and
/// case-insensitive hits win over prefix matches; prefix candidates from both tables are pooled.
fn member<'a>(
  registers: &'a NameTable<RegisterSpec>,
  clusters: &'a NameTable<ClusterSpec>,
  segment: &str,
) -> Result<Target<'a>, Resolution<'a>> {
  if let Some(r) = registers.get_case_insensitive(segment) {
    return Ok(Target::Register(r));
  }
  if let Some(c) = clusters.get_case_insensitive(segment) {
    return Ok(Target::Cluster(c));
  }

  let register_candidates = registers.prefix_candidates(segment);
  let cluster_candidates = clusters.prefix_candidates(segment);

  match (register_candidates.as_slice(), cluster_candidates.as_slice()) {
    ([], []) => Err(Resolution::NotFound {
      segment: segment.to_owned(),
    }),
    ([r], []) => registers
      .get_exact(r)
      .map(Target::Register)
      .ok_or_else(|| Resolution::NotFound {
        segment: segment.to_owned(),
      }),
    ([], [c]) => clusters
      .get_exact(c)
      .map(Target::Cluster)
      .ok_or_else(|| Resolution::NotFound {
        segment: segment.to_owned(),
      }),
    (rs, cs) => Err(Resolution::Ambiguous {
      segment: segment.to_owned(),
      candidates: rs.iter().chain(cs.iter()).map(|k| k.to_string()).collect(),
    }),
  }
}

fn unresolved<'a, T>(segment: &str, lookup: Lookup<'_, T>) -> Resolution<'a> {
  match lookup {
    Lookup::Ambiguous(candidates) => Resolution::Ambiguous {
      segment: segment.to_owned(),
      candidates: candidates.into_iter().map(|k| k.to_owned()).collect(),
    },
    _ => Resolution::NotFound {
      segment: segment.to_owned(),
    },
  }
}
