//! CSDL XML emission.
//!
//! A textual projection of the document tree in tree order. Nothing is
//! reordered or inferred; the only transformation is attribute escaping and
//! the XML defaults, where `Nullable` is assumed true unless written.

use std::borrow::Cow;
use std::fmt::Write as _;

use serde_json::Value;
use sta_model::Annotations;

use crate::document::{
    CsdlDocument, DEFAULT_ENUM_UNDERLYING_TYPE, EntitySetItem, PropertyItem, Schema, SchemaItem,
    StructuralProperty, wrap_collection,
};

const EDMX_NS: &str = "http://docs.oasis-open.org/odata/ns/edmx";
const EDM_NS: &str = "http://docs.oasis-open.org/odata/ns/edm";

impl CsdlDocument {
    /// Emit the document as CSDL XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut xml = XmlWriter::default();
        xml.out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        xml.open(
            "edmx:Edmx",
            &[("Version", self.version.as_str()), ("xmlns:edmx", EDMX_NS)],
        );
        xml.open("edmx:DataServices", &[]);
        for schema in &self.schemas {
            write_schema(&mut xml, schema);
        }
        xml.close("edmx:DataServices");
        xml.close("edmx:Edmx");
        xml.out
    }
}

fn write_schema(xml: &mut XmlWriter, schema: &Schema) {
    let mut attributes = vec![("Namespace", schema.namespace.as_str())];
    if let Some(alias) = &schema.alias {
        attributes.push(("Alias", alias.as_str()));
    }
    attributes.push(("xmlns", EDM_NS));
    xml.open("Schema", &attributes);
    for item in &schema.items {
        write_item(xml, item);
    }
    write_annotations(xml, &schema.annotations);
    xml.close("Schema");
}

fn write_item(xml: &mut XmlWriter, item: &SchemaItem) {
    match item {
        SchemaItem::EntityType(entity_type) => {
            xml.open("EntityType", &[("Name", entity_type.name.as_str())]);
            if !entity_type.key.is_empty() {
                xml.open("Key", &[]);
                for key in &entity_type.key {
                    xml.empty("PropertyRef", &[("Name", key.as_str())]);
                }
                xml.close("Key");
            }
            for property in &entity_type.properties {
                match property {
                    PropertyItem::Structural(p) => write_property(xml, p),
                    PropertyItem::Navigation(nav) => {
                        let type_name = wrap_collection(&nav.type_name, nav.collection);
                        let mut attributes = vec![("Name", nav.name.as_str()), ("Type", type_name.as_str())];
                        // Collection-valued navigation properties carry no
                        // Nullable attribute.
                        if !nav.collection && !nav.nullable {
                            attributes.push(("Nullable", "false"));
                        }
                        if let Some(partner) = &nav.partner {
                            attributes.push(("Partner", partner.as_str()));
                        }
                        xml.element("NavigationProperty", &attributes, &nav.annotations);
                    }
                }
            }
            write_annotations(xml, &entity_type.annotations);
            xml.close("EntityType");
        }
        SchemaItem::ComplexType(complex) => {
            let mut attributes = vec![("Name", complex.name.as_str())];
            if complex.open {
                attributes.push(("OpenType", "true"));
            }
            xml.open("ComplexType", &attributes);
            for property in &complex.properties {
                write_property(xml, property);
            }
            write_annotations(xml, &complex.annotations);
            xml.close("ComplexType");
        }
        SchemaItem::EnumType(enumeration) => {
            let mut attributes = vec![("Name", enumeration.name.as_str())];
            if enumeration.underlying_type != DEFAULT_ENUM_UNDERLYING_TYPE {
                attributes.push(("UnderlyingType", enumeration.underlying_type.as_str()));
            }
            if enumeration.is_flags {
                attributes.push(("IsFlags", "true"));
            }
            xml.open("EnumType", &attributes);
            for (name, value) in &enumeration.members {
                let value = value.to_string();
                xml.empty("Member", &[("Name", name.as_str()), ("Value", value.as_str())]);
            }
            write_annotations(xml, &enumeration.annotations);
            xml.close("EnumType");
        }
        SchemaItem::TypeDefinition(definition) => {
            xml.element(
                "TypeDefinition",
                &[
                    ("Name", definition.name.as_str()),
                    ("UnderlyingType", definition.underlying_type.as_str()),
                ],
                &definition.annotations,
            );
        }
        SchemaItem::EntityContainer(container) => {
            xml.open("EntityContainer", &[("Name", container.name.as_str())]);
            for set in &container.entity_sets {
                write_entity_set(xml, set);
            }
            write_annotations(xml, &container.annotations);
            xml.close("EntityContainer");
        }
    }
}

fn write_property(xml: &mut XmlWriter, property: &StructuralProperty) {
    let type_name = property.full_type_name();
    let facets = &property.facets;
    let max_length = facets.max_length.map(|v| v.to_string());
    let precision = facets.precision.map(|v| v.to_string());
    let scale = facets.scale.map(|v| v.to_string());

    let mut attributes = vec![("Name", property.name.as_str()), ("Type", type_name.as_str())];
    if !property.nullable {
        attributes.push(("Nullable", "false"));
    }
    let optional = [
        ("MaxLength", max_length.as_deref()),
        ("Precision", precision.as_deref()),
        ("Scale", scale.as_deref()),
        ("SRID", facets.srid.as_deref()),
        ("DefaultValue", facets.default_value.as_deref()),
    ];
    attributes.extend(optional.into_iter().filter_map(|(name, value)| Some((name, value?))));
    xml.element("Property", &attributes, &property.annotations);
}

fn write_entity_set(xml: &mut XmlWriter, set: &EntitySetItem) {
    let attributes = [("Name", set.name.as_str()), ("EntityType", set.entity_type.as_str())];
    if set.navigation_bindings.is_empty() && set.annotations.is_empty() {
        xml.empty("EntitySet", &attributes);
        return;
    }
    xml.open("EntitySet", &attributes);
    for (path, target) in &set.navigation_bindings {
        xml.empty(
            "NavigationPropertyBinding",
            &[("Path", path.as_str()), ("Target", target.as_str())],
        );
    }
    write_annotations(xml, &set.annotations);
    xml.close("EntitySet");
}

fn write_annotations(xml: &mut XmlWriter, annotations: &Annotations) {
    for (term, value) in annotations {
        let (kind, text) = match value {
            Value::Bool(b) => ("Bool", b.to_string()),
            Value::Number(n) if n.is_i64() || n.is_u64() => ("Int", n.to_string()),
            Value::Number(n) => ("Float", n.to_string()),
            Value::String(s) => ("String", s.clone()),
            other => ("String", other.to_string()),
        };
        xml.empty("Annotation", &[("Term", term.as_str()), (kind, text.as_str())]);
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    fn start(&mut self, tag: &str, attributes: &[(&str, &str)]) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attributes {
            // Writing to a String cannot fail.
            let _ = write!(self.out, " {name}=\"{}\"", escape(value));
        }
    }

    fn open(&mut self, tag: &str, attributes: &[(&str, &str)]) {
        self.start(tag, attributes);
        self.out.push_str(">\n");
        self.depth += 1;
    }

    fn empty(&mut self, tag: &str, attributes: &[(&str, &str)]) {
        self.start(tag, attributes);
        self.out.push_str("/>\n");
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        let _ = writeln!(self.out, "</{tag}>");
    }

    /// An element whose only children are its annotations.
    fn element(&mut self, tag: &str, attributes: &[(&str, &str)], annotations: &Annotations) {
        if annotations.is_empty() {
            self.empty(tag, attributes);
        } else {
            self.open(tag, attributes);
            write_annotations(self, annotations);
            self.close(tag);
        }
    }
}

fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn emits_entity_types_and_containers_in_tree_order() {
        let doc = CsdlDocument::from_json(&json!({
            "$EntityContainer": "x.Container",
            "x": {
                "Thing": {
                    "$Kind": "EntityType",
                    "$Key": ["id"],
                    "id": {"$Type": "Edm.Int64"},
                    "name": {"$Nullable": true, "$MaxLength": 64, "@Core.Description": "Label"},
                    "Locations": {
                        "$Kind": "NavigationProperty",
                        "$Type": "x.Location",
                        "$Collection": true,
                        "$Partner": "Things"
                    }
                },
                "Container": {
                    "$Kind": "EntityContainer",
                    "Things": {
                        "$Collection": true,
                        "$Type": "x.Thing",
                        "$NavigationPropertyBinding": {"Locations": "Locations"}
                    }
                }
            }
        }))
        .unwrap();

        let expected = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="4.01" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="x" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityType Name="Thing">
        <Key>
          <PropertyRef Name="id"/>
        </Key>
        <Property Name="id" Type="Edm.Int64" Nullable="false"/>
        <Property Name="name" Type="Edm.String" MaxLength="64">
          <Annotation Term="Core.Description" String="Label"/>
        </Property>
        <NavigationProperty Name="Locations" Type="Collection(x.Location)" Partner="Things"/>
      </EntityType>
      <EntityContainer Name="Container">
        <EntitySet Name="Things" EntityType="x.Thing">
          <NavigationPropertyBinding Path="Locations" Target="Locations"/>
        </EntitySet>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>
"#;
        assert_eq!(doc.to_xml(), expected);
    }

    #[test]
    fn enums_and_type_definitions() {
        let doc = CsdlDocument::from_json(&json!({
            "x": {
                "Colour": {"$Kind": "EnumType", "$IsFlags": true, "Red": 1, "Green": 2},
                "Code": {"$Kind": "TypeDefinition", "$UnderlyingType": "Edm.String"}
            }
        }))
        .unwrap();
        let xml = doc.to_xml();
        assert!(xml.contains("<EnumType Name=\"Colour\" IsFlags=\"true\">"));
        assert!(xml.contains("<Member Name=\"Green\" Value=\"2\"/>"));
        assert!(xml.contains("<TypeDefinition Name=\"Code\" UnderlyingType=\"Edm.String\"/>"));
    }

    #[test]
    fn attribute_values_are_escaped() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }
}
