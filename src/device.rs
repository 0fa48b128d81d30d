use std::{
  fs::File,
  io::{BufReader, Read},
  path::Path,
};

use log::debug;
use xmltree::Element;

use super::{peripheral::PeripheralSpec, ClusterSpec, FieldSpec, RegisterProperties, RegisterSpec};
use crate::{
  error::{isolate, SvdError, SvdResult},
  name_table::NameTable,
  xml::{child_text, child_text_clean, children},
};

/// The model of one device description: every peripheral, in document order. Built once per
/// load and not modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSpec {
  pub name: Option<String>,
  pub description: Option<String>,

  /// Register defaults declared at device level. Already applied to every register.
  pub default_register_properties: RegisterProperties,

  pub peripherals: NameTable<PeripheralSpec>,
}
impl DeviceSpec {
  pub fn from_xml(xml: &str) -> SvdResult<Self> {
    Self::from_reader(xml.as_bytes())
  }

  pub fn from_reader<R: Read>(reader: R) -> SvdResult<Self> {
    Self::new(&Element::parse(reader)?)
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> SvdResult<Self> {
    Self::from_reader(BufReader::new(File::open(path)?))
  }

  /// Builds the model from the root `device` element.
  ///
  /// Peripherals are built in document order, so `derivedFrom` can only name a peripheral that
  /// appears earlier. A peripheral that fails with a non-fatal error is logged and left out; a
  /// fatal error (including an unresolved `derivedFrom` anywhere in the document) fails the whole
  /// load.
  pub fn new(root: &Element) -> SvdResult<Self> {
    if root.name != "device" {
      return Err(SvdError::Structural(format!(
        "root element is '{}', expected 'device'",
        root.name
      )));
    }

    let container = match root.get_child("peripherals") {
      Some(c) => c,
      None => return Err(SvdError::structural("no 'peripherals' element")),
    };

    let default_register_properties =
      RegisterProperties::from_element(root, "device", &RegisterProperties::default())?;

    let mut peripherals = NameTable::new();
    for el in children(container, "peripheral") {
      let what = format!("peripheral {}", child_text(el, "name").unwrap_or_default());
      let built = isolate(
        PeripheralSpec::build(el, &default_register_properties, &peripherals),
        &what,
      )?;

      for peripheral in built {
        peripherals.insert(peripheral.name.clone(), peripheral);
      }
    }

    debug!("Loaded {} peripherals", peripherals.len());

    Ok(Self {
      name: child_text(root, "name"),
      description: child_text_clean(root, "description"),
      default_register_properties,
      peripherals,
    })
  }

  /// Recursively iterates every cluster on the device.
  pub fn iter_clusters(&self) -> impl Iterator<Item = &ClusterSpec> {
    self.peripherals.values().flat_map(|p| p.iter_clusters())
  }

  /// Recursively iterates every register on the device.
  pub fn iter_registers(&self) -> impl Iterator<Item = &RegisterSpec> {
    self.peripherals.values().flat_map(|p| p.iter_registers())
  }

  pub fn iter_fields(&self) -> impl Iterator<Item = &FieldSpec> {
    self.peripherals.values().flat_map(|p| p.iter_fields())
  }
}
