use log::debug;
use xmltree::Element;

use super::{
  add_offset, cluster::ClusterSpec, register::RegisterSpec, FieldSpec, RegisterProperties, Scope,
};
use crate::{
  cluster::build_children,
  dim::{substitute, DimSpec},
  error::{ElementKind, SvdError, SvdResult},
  name_table::NameTable,
  xml::{attribute, child_text, child_text_clean, child_u32},
};

/// Describes a peripheral on a device.
#[derive(Debug, Clone, PartialEq)]
pub struct PeripheralSpec {
  /// Name of the peripheral. Should be unique for the entire device.
  pub name: String,

  /// Overview of the purpose and functionality of the peripheral.
  pub description: Option<String>,

  /// Lowest address reserved or used by the peripheral.
  pub base_address: u32,

  /// Top-level registers that exist on this peripheral.
  pub registers: NameTable<RegisterSpec>,

  /// Top-level register clusters that exist on this peripheral. Clusters may contain registers
  /// or other clusters.
  pub clusters: NameTable<ClusterSpec>,
}
impl PeripheralSpec {
  /// Builds the peripheral (or peripherals, for a `dim` array) described by `el`. `peripherals`
  /// holds the peripherals built so far, which is where `derivedFrom` looks.
  pub(crate) fn build(
    el: &Element,
    properties: &RegisterProperties,
    peripherals: &NameTable<PeripheralSpec>,
  ) -> SvdResult<Vec<Self>> {
    let name = match child_text(el, "name") {
      Some(n) => n,
      None => return Err(SvdError::missing("peripheral", "name")),
    };
    let context = format!("peripheral {}", name);

    let base_address = match child_u32(el, "baseAddress", &context)? {
      Some(b) => b,
      None => return Err(SvdError::MissingBaseAddress { peripheral: name }),
    };

    match DimSpec::from_element(el, &context)? {
      None => Ok(vec![Self::build_one(
        el,
        name,
        None,
        base_address,
        properties,
        peripherals,
      )?]),
      Some(dim) => dim
        .offsets()
        .map(|(index, offset)| {
          Self::build_one(
            el,
            substitute(&name, index),
            Some(index),
            add_offset(base_address, offset, &context, "baseAddress")?,
            properties,
            peripherals,
          )
        })
        .collect(),
    }
  }

  pub fn address(&self) -> u32 {
    self.base_address
  }

  /// Recursively iterates all the register clusters contained within this peripheral.
  pub fn iter_clusters<'a>(&'a self) -> Box<dyn Iterator<Item = &ClusterSpec> + 'a> {
    Box::new(self.clusters.values().flat_map(|c| c.iter_clusters()))
  }

  /// Recursively iterates all the registers contained within this peripheral.
  pub fn iter_registers<'a>(&'a self) -> Box<dyn Iterator<Item = &RegisterSpec> + 'a> {
    Box::new(
      self
        .registers
        .values()
        .chain(self.clusters.values().flat_map(|c| c.iter_registers())),
    )
  }

  /// Recursively iterates all the register fields contained within this peripheral.
  pub fn iter_fields<'a>(&'a self) -> Box<dyn Iterator<Item = &FieldSpec> + 'a> {
    Box::new(self.iter_registers().flat_map(|r| r.fields.values()))
  }

  /// Every register in this peripheral paired with its path relative to the peripheral
  /// (`CLUSTER.REGISTER` for nested ones), sorted by address. Registers that share an address
  /// keep their document order.
  pub fn registers_by_address(&self) -> Vec<(String, &RegisterSpec)> {
    let mut registers = Vec::new();
    collect_registers("", &self.registers, &self.clusters, &mut registers);
    registers.sort_by_key(|(_, r)| r.address());
    registers
  }

  fn build_one(
    el: &Element,
    name: String,
    index: Option<&str>,
    base_address: u32,
    properties: &RegisterProperties,
    peripherals: &NameTable<PeripheralSpec>,
  ) -> SvdResult<Self> {
    let context = format!("peripheral {}", name);
    let interpolate = |text: String| match index {
      Some(i) => substitute(&text, i),
      None => text,
    };

    let description = child_text_clean(el, "description").map(interpolate);
    let properties = RegisterProperties::from_element(el, &context, properties)?;

    let (mut peripheral, derived) = match attribute(el, "derivedFrom").map(interpolate) {
      Some(derived_from) => {
        let source = match peripherals.get_case_insensitive(&derived_from) {
          Some(s) => s,
          None => {
            return Err(SvdError::UnresolvedDerivation {
              kind: ElementKind::Peripheral,
              name,
              derived_from,
            })
          }
        };
        debug!("Deriving {} from {}", name, source.name);

        let mut peripheral = Self {
          name,
          description: description.or_else(|| source.description.clone()),
          base_address,
          registers: source.registers.clone(),
          clusters: source.clusters.clone(),
        };
        peripheral.rebase()?;
        (peripheral, true)
      }
      None => (
        Self {
          name,
          description,
          base_address,
          registers: NameTable::new(),
          clusters: NameTable::new(),
        },
        false,
      ),
    };

    if let Some(container) = el.get_child("registers") {
      let scope = Scope {
        base_address,
        properties,
      };
      build_children(
        container,
        &scope,
        &mut peripheral.registers,
        &mut peripheral.clusters,
        derived,
        &context,
      )?;
    }

    debug!(
      "Built {} at {:#010x}: {} registers, {} clusters",
      peripheral.name,
      peripheral.base_address,
      peripheral.registers.len(),
      peripheral.clusters.len()
    );

    Ok(peripheral)
  }

  /// Re-stamps every register and cluster with this peripheral's base address.
  fn rebase(&mut self) -> SvdResult<()> {
    let base_address = self.base_address;
    for register in self.registers.values_mut() {
      register.rebase(base_address)?;
    }
    for cluster in self.clusters.values_mut() {
      cluster.rebase(base_address)?;
    }
    Ok(())
  }
}

fn collect_registers<'a>(
  prefix: &str,
  registers: &'a NameTable<RegisterSpec>,
  clusters: &'a NameTable<ClusterSpec>,
  out: &mut Vec<(String, &'a RegisterSpec)>,
) {
  for (name, register) in registers.iter() {
    out.push((format!("{}{}", prefix, name), register));
  }
  for (name, cluster) in clusters.iter() {
    collect_registers(
      &format!("{}{}.", prefix, name),
      &cluster.registers,
      &cluster.clusters,
      out,
    );
  }
}
