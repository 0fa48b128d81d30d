use xmltree::Element;

use super::register::RegisterSpec;
use super::{add_offset, FieldSpec, RegisterProperties, Scope};
use crate::{
  dim::{substitute, DimSpec},
  error::{isolate, ElementKind, SvdError, SvdResult},
  name_table::NameTable,
  xml::{attribute, child_text, child_text_clean, register_cluster_children, required_u32},
};

/// A named, address-relative group of registers (and nested clusters) inside a peripheral or
/// another cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
  base_address: u32,
  pub name: String,
  pub description: Option<String>,
  pub derived_from: Option<String>,
  pub address_offset: u32,
  pub registers: NameTable<RegisterSpec>,
  pub clusters: NameTable<ClusterSpec>,
}
impl ClusterSpec {
  /// Builds the cluster (or clusters, for a `dim` array) described by `el`, including everything
  /// nested inside it.
  pub(crate) fn build(
    el: &Element,
    scope: &Scope,
    siblings: &NameTable<ClusterSpec>,
  ) -> SvdResult<Vec<Self>> {
    let name = match child_text(el, "name") {
      Some(n) => n,
      None => return Err(SvdError::missing("cluster", "name")),
    };
    let context = format!("cluster {}", name);
    let address_offset = required_u32(el, "addressOffset", &context)?;

    match DimSpec::from_element(el, &context)? {
      None => Ok(vec![Self::build_one(
        el,
        name,
        None,
        address_offset,
        scope,
        siblings,
      )?]),
      Some(dim) => dim
        .offsets()
        .map(|(index, offset)| {
          Self::build_one(
            el,
            substitute(&name, index),
            Some(index),
            add_offset(address_offset, offset, &context, "addressOffset")?,
            scope,
            siblings,
          )
        })
        .collect(),
    }
  }

  /// The absolute address of this cluster: the enclosing base address plus every offset along
  /// the way.
  pub fn address(&self) -> u32 {
    self.base_address
  }

  pub fn base_address(&self) -> u32 {
    self.base_address
  }

  pub fn iter_clusters<'a>(&'a self) -> Box<dyn Iterator<Item = &ClusterSpec> + 'a> {
    Box::new(
      vec![self]
        .into_iter()
        .chain(self.clusters.values().flat_map(|c| c.iter_clusters())),
    )
  }

  /// Recursively iterates the registers in this cluster and its nested clusters.
  pub fn iter_registers<'a>(&'a self) -> Box<dyn Iterator<Item = &RegisterSpec> + 'a> {
    Box::new(
      self
        .registers
        .values()
        .chain(self.clusters.values().flat_map(|c| c.iter_registers())),
    )
  }

  pub fn iter_fields<'a>(&'a self) -> Box<dyn Iterator<Item = &FieldSpec> + 'a> {
    Box::new(self.iter_registers().flat_map(|r| r.fields.values()))
  }

  /// Re-stamps the base address of this cluster and everything inside it for a new enclosing
  /// base address.
  pub(crate) fn rebase(&mut self, parent_base_address: u32) -> SvdResult<()> {
    let base_address = add_offset(
      parent_base_address,
      self.address_offset,
      &format!("cluster {}", self.name),
      "addressOffset",
    )?;
    self.base_address = base_address;

    for register in self.registers.values_mut() {
      register.rebase(base_address)?;
    }
    for cluster in self.clusters.values_mut() {
      cluster.rebase(base_address)?;
    }
    Ok(())
  }

  fn build_one(
    el: &Element,
    name: String,
    index: Option<&str>,
    address_offset: u32,
    scope: &Scope,
    siblings: &NameTable<ClusterSpec>,
  ) -> SvdResult<Self> {
    let context = format!("cluster {}", name);
    let interpolate = |text: String| match index {
      Some(i) => substitute(&text, i),
      None => text,
    };

    let description = child_text_clean(el, "description").map(interpolate);
    let derived_from = attribute(el, "derivedFrom").map(interpolate);
    let properties = RegisterProperties::from_element(el, &context, &scope.properties)?;

    let mut cluster = match derived_from {
      Some(derived_from) => {
        let source = match siblings.get_case_insensitive(&derived_from) {
          Some(s) => s,
          None => {
            return Err(SvdError::UnresolvedDerivation {
              kind: ElementKind::Cluster,
              name,
              derived_from,
            })
          }
        };

        let mut cluster = source.clone();
        cluster.name = name;
        cluster.derived_from = Some(derived_from);
        cluster.address_offset = address_offset;
        if description.is_some() {
          cluster.description = description;
        }
        cluster.rebase(scope.base_address)?;
        cluster
      }
      None => Self {
        base_address: add_offset(scope.base_address, address_offset, &context, "addressOffset")?,
        name,
        description,
        derived_from: None,
        address_offset,
        registers: NameTable::new(),
        clusters: NameTable::new(),
      },
    };

    let inner = Scope {
      base_address: cluster.base_address,
      properties,
    };
    let overrides = cluster.derived_from.is_some();
    build_children(
      el,
      &inner,
      &mut cluster.registers,
      &mut cluster.clusters,
      overrides,
      &context,
    )?;

    Ok(cluster)
  }
}

/// Builds the `register` and `cluster` children of `el`, in document order, into the two tables
/// of their container. A child that fails with a non-fatal error is skipped. With `overrides`,
/// a child replaces an existing entry of the same name (the container was copied through
/// `derivedFrom`).
pub(crate) fn build_children(
  el: &Element,
  scope: &Scope,
  registers: &mut NameTable<RegisterSpec>,
  clusters: &mut NameTable<ClusterSpec>,
  overrides: bool,
  owner: &str,
) -> SvdResult<()> {
  for child in register_cluster_children(el) {
    let what = format!(
      "{} {} in {}",
      child.name,
      child_text(child, "name").unwrap_or_default(),
      owner
    );

    if child.name == "register" {
      for register in isolate(RegisterSpec::build(child, scope, registers), &what)? {
        let key = register.name.clone();
        if overrides {
          registers.upsert(&key, register);
        } else {
          registers.insert(key, register);
        }
      }
    } else {
      for cluster in isolate(ClusterSpec::build(child, scope, clusters), &what)? {
        let key = cluster.name.clone();
        if overrides {
          clusters.upsert(&key, cluster);
        } else {
          clusters.insert(key, cluster);
        }
      }
    }
  }

  Ok(())
}
