use xmltree::Element;

use super::field::{FieldContext, FieldSpec};
use super::{add_offset, AccessSpec, RegisterProperties, Scope};
use crate::{
  dim::{substitute, DimSpec},
  error::{ElementKind, SvdError, SvdResult},
  name_table::NameTable,
  xml::{attribute, child_text, child_text_clean, children, required_u32},
};

/// Describes a register. Registers may be top-level constructs of a peripheral or may be nested
/// within register clusters.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSpec {
  base_address: u32,

  /// Name that identifies the register. Should be unique within the scope of its parent.
  pub name: String,

  /// Description of the details of the register. May describe its purpose, operation, and effects
  /// on other parts of the device.
  pub description: Option<String>,

  /// The sibling register this one was copied from, if any.
  pub derived_from: Option<String>,

  /// Register's starting address relative to its parent.
  pub address_offset: u32,

  /// The bit width of the register.
  pub size: u32,

  /// The access rights of the register.
  pub access: AccessSpec,

  /// The value of the register after reset.
  pub reset_value: Option<u64>,

  /// The bits of the register that have a defined reset value.
  pub reset_mask: Option<u64>,

  /// The fields that exist on the register.
  pub fields: NameTable<FieldSpec>,
}
impl RegisterSpec {
  /// Builds the register (or registers, for a `dim` array) described by `el`. `siblings` holds
  /// the registers already built in the same container, which is where `derivedFrom` looks.
  pub(crate) fn build(
    el: &Element,
    scope: &Scope,
    siblings: &NameTable<RegisterSpec>,
  ) -> SvdResult<Vec<Self>> {
    let name = match child_text(el, "name") {
      Some(n) => n,
      None => return Err(SvdError::missing("register", "name")),
    };
    let context = format!("register {}", name);
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

  /// The memory address of this register
  pub fn address(&self) -> u32 {
    self.base_address + self.address_offset
  }

  /// The absolute address of the peripheral or cluster that contains this register.
  pub fn base_address(&self) -> u32 {
    self.base_address
  }

  pub fn readable(&self) -> bool {
    self.access.readable()
  }

  pub fn writable(&self) -> bool {
    self.access.writable()
  }

  /// The fields of this register, lowest bit first.
  pub fn fields_by_offset(&self) -> Vec<&FieldSpec> {
    let mut fields: Vec<&FieldSpec> = self.fields.values().collect();
    fields.sort_by_key(|f| f.bit_offset);
    fields
  }

  /// Re-stamps the enclosing base address. Fails when the register would leave the 32-bit
  /// address space.
  pub(crate) fn rebase(&mut self, base_address: u32) -> SvdResult<()> {
    add_offset(
      base_address,
      self.address_offset,
      &format!("register {}", self.name),
      "addressOffset",
    )?;
    self.base_address = base_address;
    Ok(())
  }

  fn build_one(
    el: &Element,
    name: String,
    index: Option<&str>,
    address_offset: u32,
    scope: &Scope,
    siblings: &NameTable<RegisterSpec>,
  ) -> SvdResult<Self> {
    let context = format!("register {}", name);
    let interpolate = |text: String| match index {
      Some(i) => substitute(&text, i),
      None => text,
    };

    let description = child_text_clean(el, "description").map(interpolate);
    let derived_from = attribute(el, "derivedFrom").map(interpolate);

    let mut register = match derived_from {
      Some(derived_from) => {
        let own = RegisterProperties::from_element(el, &context, &RegisterProperties::default())?;

        let source = match siblings.get_case_insensitive(&derived_from) {
          Some(s) => s,
          None => {
            return Err(SvdError::UnresolvedDerivation {
              kind: ElementKind::Register,
              name,
              derived_from,
            })
          }
        };

        let mut register = source.clone();
        register.name = name;
        register.derived_from = Some(derived_from);
        register.address_offset = address_offset;
        register.rebase(scope.base_address)?;
        if description.is_some() {
          register.description = description;
        }
        if let Some(size) = own.size {
          register.size = size;
        }
        if let Some(access) = own.access {
          register.access = access;
        }
        if own.reset_value.is_some() {
          register.reset_value = own.reset_value;
        }
        if own.reset_mask.is_some() {
          register.reset_mask = own.reset_mask;
        }

        let (size, reset_value) = (register.size, register.reset_value);
        for field in register.fields.values_mut() {
          field.fit_to(size, reset_value)?;
        }
        register
      }
      None => {
        let props = RegisterProperties::from_element(el, &context, &scope.properties)?;
        add_offset(scope.base_address, address_offset, &context, "addressOffset")?;

        Self {
          base_address: scope.base_address,
          name,
          description,
          derived_from: None,
          address_offset,
          size: props.size_or_default(),
          access: props.access_or_default(),
          reset_value: props.reset_value,
          reset_mask: props.reset_mask,
          fields: NameTable::new(),
        }
      }
    };

    let ctx = FieldContext {
      register: &register.name,
      size: register.size,
      access: register.access,
      reset_value: register.reset_value,
    };

    let mut own_fields = Vec::new();
    if let Some(fields) = el.get_child("fields") {
      for f in children(fields, "field") {
        own_fields.extend(FieldSpec::build(f, &ctx)?);
      }
    }

    for field in own_fields {
      let key = field.name.clone();
      if register.derived_from.is_some() {
        register.fields.upsert(&key, field);
      } else {
        register.fields.insert(key, field);
      }
    }

    Ok(register)
  }
}

#[cfg(test)]
mod tests {
  use super::RegisterSpec;
  use crate::{AccessSpec, NameTable, RegisterProperties, Scope, SvdError};
  use xmltree::Element;

  fn scope(base_address: u32) -> Scope {
    Scope {
      base_address,
      properties: RegisterProperties::default(),
    }
  }

  fn build(
    xml: &str,
    scope: &Scope,
    siblings: &NameTable<RegisterSpec>,
  ) -> Result<Vec<RegisterSpec>, SvdError> {
    let el = Element::parse(xml.as_bytes()).unwrap();
    RegisterSpec::build(&el, scope, siblings)
  }

  fn table(registers: Vec<RegisterSpec>) -> NameTable<RegisterSpec> {
    let mut t = NameTable::new();
    for r in registers {
      t.insert(r.name.clone(), r);
    }
    t
  }

  const CR1: &str = r##"
    <register>
      <name>CR1</name>
      <description>Control register 1</description>
      <addressOffset>0x0C</addressOffset>
      <size>16</size>
      <access>read-write</access>
      <resetValue>0x0003</resetValue>
      <fields>
        <field>
          <name>UE</name>
          <bitOffset>0</bitOffset>
          <bitWidth>1</bitWidth>
        </field>
        <field>
          <name>TXEIE</name>
          <bitRange>[7:7]</bitRange>
          <access>write-only</access>
        </field>
        <field>
          <name>M</name>
          <lsb>1</lsb>
          <msb>2</msb>
        </field>
      </fields>
    </register>
  "##;

  #[test]
  fn can_create_single_from_xml() {
    let mut specs = build(CR1, &scope(0x4001_3800), &NameTable::new()).unwrap();

    assert_eq!(1, specs.len());
    let rs = specs.pop().unwrap();

    assert_eq!("CR1", rs.name);
    assert_eq!("Control register 1", rs.description.clone().unwrap());
    assert_eq!(0x0C, rs.address_offset);
    assert_eq!(0x4001_380C, rs.address());
    assert_eq!(16, rs.size);
    assert_eq!(AccessSpec::ReadWrite, rs.access);
    assert_eq!(Some(3), rs.reset_value);

    assert_eq!(
      vec!["UE", "TXEIE", "M"],
      rs.fields.keys().collect::<Vec<&str>>()
    );
    assert_eq!(AccessSpec::ReadWrite, rs.fields.get_exact("UE").unwrap().access);
    assert_eq!(AccessSpec::WriteOnly, rs.fields.get_exact("TXEIE").unwrap().access);
    assert_eq!(Some(1), rs.fields.get_exact("M").unwrap().reset_value);

    let fields = rs.fields_by_offset();
    let by_offset: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(vec!["UE", "M", "TXEIE"], by_offset);
  }

  #[test]
  fn defaults_size_and_access() {
    let rs = build(
      "<register><name>DR</name><addressOffset>4</addressOffset></register>",
      &scope(0),
      &NameTable::new(),
    )
    .unwrap();

    assert_eq!(32, rs[0].size);
    assert_eq!(AccessSpec::ReadWrite, rs[0].access);
    assert!(rs[0].readable());
    assert!(rs[0].writable());
    assert!(rs[0].reset_value.is_none());
  }

  #[test]
  fn inherits_scope_properties() {
    let s = Scope {
      base_address: 0,
      properties: RegisterProperties {
        size: Some(8),
        access: Some(AccessSpec::ReadOnly),
        reset_value: None,
        reset_mask: Some(0xff),
      },
    };
    let rs = build(
      "<register><name>SR</name><addressOffset>0</addressOffset></register>",
      &s,
      &NameTable::new(),
    )
    .unwrap();

    assert_eq!(8, rs[0].size);
    assert_eq!(AccessSpec::ReadOnly, rs[0].access);
    assert!(!rs[0].writable());
    assert_eq!(Some(0xff), rs[0].reset_mask);
  }

  #[test]
  fn requires_address_offset() {
    match build("<register><name>DR</name></register>", &scope(0), &NameTable::new()) {
      Err(SvdError::MissingElement { tag, .. }) => assert_eq!("addressOffset", tag),
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn fails_when_a_field_has_no_bit_range() {
    let result = build(
      r##"
      <register>
        <name>DR</name>
        <addressOffset>4</addressOffset>
        <fields>
          <field><name>OK</name><bitRange>[3:0]</bitRange></field>
          <field><name>BROKEN</name></field>
        </fields>
      </register>
      "##,
      &scope(0),
      &NameTable::new(),
    );

    match result {
      Err(SvdError::MissingBitRange { field }) => assert_eq!("BROKEN", field),
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn expands_register_arrays() {
    let rs = build(
      r##"
      <register>
        <name>CH%s</name>
        <description>Channel %s</description>
        <addressOffset>0x10</addressOffset>
        <dim>3</dim>
        <dimIncrement>4</dimIncrement>
        <fields>
          <field><name>EN</name><bitRange>[0:0]</bitRange></field>
        </fields>
      </register>
      "##,
      &scope(0x1000),
      &NameTable::new(),
    )
    .unwrap();

    assert_eq!(3, rs.len());
    assert_eq!(
      vec![("CH0", 0x10), ("CH1", 0x14), ("CH2", 0x18)],
      rs.iter()
        .map(|r| (r.name.as_str(), r.address_offset))
        .collect::<Vec<(&str, u32)>>()
    );
    assert_eq!("Channel 1", rs[1].description.clone().unwrap());
    assert_eq!(0x1018, rs[2].address());
    assert!(rs[2].fields.get_exact("EN").is_some());
  }

  #[test]
  fn expands_register_arrays_with_named_indices() {
    let rs = build(
      r##"
      <register>
        <name>FOO_%s</name>
        <description>Bar</description>
        <addressOffset>3000</addressOffset>
        <dim>3</dim>
        <dimIndex>one,two,three</dimIndex>
        <dimIncrement>0x20</dimIncrement>
      </register>
      "##,
      &scope(0),
      &NameTable::new(),
    )
    .unwrap();

    assert_eq!("FOO_one", rs[0].name);
    assert_eq!("FOO_three", rs[2].name);
    assert_eq!(3064, rs[2].address_offset);
    assert_eq!("Bar", rs[2].description.clone().unwrap());
  }

  #[test]
  fn derives_from_sibling() {
    let siblings = table(build(CR1, &scope(0x4000_0000), &NameTable::new()).unwrap());

    let mut rs = build(
      r##"
      <register derivedFrom="cr1">
        <name>CR2</name>
        <addressOffset>0x10</addressOffset>
        <access>read-only</access>
        <fields>
          <field>
            <name>M</name>
            <bitRange>[3:1]</bitRange>
          </field>
          <field>
            <name>STOP</name>
            <bitRange>[13:12]</bitRange>
          </field>
        </fields>
      </register>
      "##,
      &scope(0x4000_0000),
      &siblings,
    )
    .unwrap();
    let cr2 = rs.pop().unwrap();

    // Own values
    assert_eq!("CR2", cr2.name);
    assert_eq!(0x4000_0010, cr2.address());
    assert_eq!(AccessSpec::ReadOnly, cr2.access);
    assert_eq!(Some("cr1".to_owned()), cr2.derived_from);

    // Copied values
    assert_eq!("Control register 1", cr2.description.clone().unwrap());
    assert_eq!(16, cr2.size);

    assert_eq!(
      vec!["UE", "TXEIE", "M", "STOP"],
      cr2.fields.keys().collect::<Vec<&str>>()
    );
    assert_eq!(3, cr2.fields.get_exact("M").unwrap().bit_width);
    assert_eq!(AccessSpec::ReadOnly, cr2.fields.get_exact("STOP").unwrap().access);
  }

  #[test]
  fn derived_copy_is_independent() {
    let siblings = table(build(CR1, &scope(0), &NameTable::new()).unwrap());

    let mut cr2 = build(
      r##"<register derivedFrom="CR1"><name>CR2</name><addressOffset>0x10</addressOffset></register>"##,
      &scope(0),
      &siblings,
    )
    .unwrap()
    .pop()
    .unwrap();

    cr2.fields.get_exact_mut("UE").unwrap().bit_width = 2;
    cr2.address_offset = 0x20;

    let cr1 = siblings.get_exact("CR1").unwrap();
    assert_eq!(1, cr1.fields.get_exact("UE").unwrap().bit_width);
    assert_eq!(0x0C, cr1.address_offset);
  }

  #[test]
  fn fails_on_forward_derivation() {
    let result = build(
      r##"<register derivedFrom="CR9"><name>CR2</name><addressOffset>0x10</addressOffset></register>"##,
      &scope(0),
      &NameTable::new(),
    );

    match result {
      Err(e @ SvdError::UnresolvedDerivation { .. }) => assert!(e.is_fatal()),
      other => panic!("unexpected {:?}", other),
    }
  }
  #[test]
  fn derived_register_refits_copied_fields() {
    let siblings = table(build(CR1, &scope(0), &NameTable::new()).unwrap());

    let cr2 = build(
      r##"
      <register derivedFrom="CR1">
        <name>CR2</name>
        <addressOffset>0x10</addressOffset>
        <resetValue>0x0005</resetValue>
      </register>
      "##,
      &scope(0),
      &siblings,
    )
    .unwrap()
    .pop()
    .unwrap();

    assert_eq!(Some(5), cr2.reset_value);
    assert_eq!(Some(1), cr2.fields.get_exact("UE").unwrap().reset_value);
    assert_eq!(Some(2), cr2.fields.get_exact("M").unwrap().reset_value);
    assert_eq!(
      Some(1),
      siblings
        .get_exact("CR1")
        .unwrap()
        .fields
        .get_exact("M")
        .unwrap()
        .reset_value
    );

    let narrow = build(
      r##"
      <register derivedFrom="CR1">
        <name>CR3</name>
        <addressOffset>0x14</addressOffset>
        <size>4</size>
      </register>
      "##,
      &scope(0),
      &siblings,
    );

    match narrow {
      Err(SvdError::InvalidBitRange { field, .. }) => assert_eq!("TXEIE", field),
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn derives_register_arrays_element_by_element() {
    let siblings = table(
      build(
        r##"
        <register>
          <name>CH%s</name>
          <description>Channel %s</description>
          <addressOffset>0x0</addressOffset>
          <dim>2</dim>
          <dimIncrement>4</dimIncrement>
          <fields>
            <field><name>EN</name><bitRange>[0:0]</bitRange></field>
          </fields>
        </register>
        "##,
        &scope(0),
        &NameTable::new(),
      )
      .unwrap(),
    );

    let rs = build(
      r##"
      <register derivedFrom="CH%s">
        <name>SHADOW%s</name>
        <addressOffset>0x20</addressOffset>
        <dim>2</dim>
        <dimIncrement>4</dimIncrement>
      </register>
      "##,
      &scope(0x1000),
      &siblings,
    )
    .unwrap();

    assert_eq!(2, rs.len());
    assert_eq!("SHADOW1", rs[1].name);
    assert_eq!(Some("CH1".to_owned()), rs[1].derived_from);
    assert_eq!("Channel 1", rs[1].description.clone().unwrap());
    assert_eq!(0x1024, rs[1].address());
    assert!(rs[1].fields.get_exact("EN").is_some());
  }

  #[test]
  fn rejects_registers_outside_the_address_space() {
    let past_end = build(
      "<register><name>R</name><addressOffset>0x20</addressOffset></register>",
      &scope(0xFFFF_FFF0),
      &NameTable::new(),
    );

    match past_end {
      Err(e @ SvdError::InvalidNumber { .. }) => assert!(!e.is_fatal()),
      other => panic!("unexpected {:?}", other),
    }

    let wide = build(
      r##"
      <register>
        <name>WIDE</name>
        <addressOffset>0</addressOffset>
        <size>128</size>
        <resetValue>0</resetValue>
        <fields>
          <field><name>HI</name><bitRange>[100:100]</bitRange></field>
        </fields>
      </register>
      "##,
      &scope(0),
      &NameTable::new(),
    );

    match wide {
      Err(SvdError::InvalidNumber { tag, .. }) => assert_eq!("size", tag),
      other => panic!("unexpected {:?}", other),
    }
  }
}
