use crate::model::{ElementType, Entity, EntityDef, MappingContext, PropertyKind, ScalarType, Value};
use std::collections::BTreeMap;

/// Mapping for the sample order aggregate:
///
/// - `PurchaseOrder` (root) with `lines: List<OrderLine>`, `notes: Map<Note>`,
///   `tags: Set<Tag>` and an embedded `shipping: Address`
/// - `OrderLine` with `adjustments: List<Adjustment>`
/// - `Address` has no identifier
pub fn order_mapping() -> MappingContext {
    MappingContext::new()
        .with_entity(
            EntityDef::new("PurchaseOrder")
                .with_id("id", ScalarType::Integer)
                .with_property("customerName", PropertyKind::Simple(ScalarType::Text))
                .with_property("lines", PropertyKind::List(ElementType::Entity("OrderLine".into())))
                .with_property("notes", PropertyKind::Map(ElementType::Entity("Note".into())))
                .with_property("tags", PropertyKind::Set(ElementType::Entity("Tag".into())))
                .with_property("shipping", PropertyKind::Entity("Address".into())),
        )
        .with_entity(
            EntityDef::new("OrderLine")
                .with_id("id", ScalarType::Integer)
                .with_property("sku", PropertyKind::Simple(ScalarType::Text))
                .with_property("quantity", PropertyKind::Simple(ScalarType::Integer))
                .with_property(
                    "adjustments",
                    PropertyKind::List(ElementType::Entity("Adjustment".into())),
                ),
        )
        .with_entity(
            EntityDef::new("Adjustment")
                .with_id("id", ScalarType::Integer)
                .with_property("amount", PropertyKind::Simple(ScalarType::Float))
                .with_property("reason", PropertyKind::Simple(ScalarType::Text)),
        )
        .with_entity(
            EntityDef::new("Note")
                .with_id("id", ScalarType::Text)
                .with_property("body", PropertyKind::Simple(ScalarType::Text)),
        )
        .with_entity(
            EntityDef::new("Tag")
                .with_id("id", ScalarType::Integer)
                .with_property("label", PropertyKind::Simple(ScalarType::Text)),
        )
        .with_entity(
            EntityDef::new("Address")
                .with_table("shipping_address")
                .with_property("street", PropertyKind::Simple(ScalarType::Text))
                .with_property("city", PropertyKind::Simple(ScalarType::Text)),
        )
}

fn order_line(sku: &str, quantity: i64, adjustments: Vec<Value>) -> Value {
    Value::Entity(
        Entity::new("OrderLine")
            .with("sku", sku)
            .with("quantity", quantity)
            .with("adjustments", Value::List(adjustments)),
    )
}

fn adjustment(amount: f64, reason: &str) -> Value {
    Value::Entity(
        Entity::new("Adjustment")
            .with("amount", amount)
            .with("reason", reason),
    )
}

/// A new order whose entities all lack ids
pub fn sample_order() -> Entity {
    let mut notes = BTreeMap::new();
    notes.insert(
        "gift".to_string(),
        Value::Entity(Entity::new("Note").with("body", "Wrap it nicely")),
    );
    notes.insert(
        "delivery".to_string(),
        Value::Entity(Entity::new("Note").with("body", "Leave at the door")),
    );

    Entity::new("PurchaseOrder")
        .with("customerName", "Ada Lovelace")
        .with(
            "lines",
            Value::List(vec![
                order_line("BIKE-001", 1, vec![adjustment(-50.0, "spring sale")]),
                order_line(
                    "HELMET-07",
                    2,
                    vec![adjustment(-5.0, "bundle"), adjustment(2.5, "engraving")],
                ),
                order_line("LOCK-03", 1, vec![]),
            ]),
        )
        .with("notes", Value::Map(notes))
        .with(
            "tags",
            Value::set_of(vec![
                Value::Entity(Entity::new("Tag").with("label", "priority")),
                Value::Entity(Entity::new("Tag").with("label", "gift")),
            ]),
        )
        .with(
            "shipping",
            Entity::new("Address")
                .with("street", "12 Analytical Row")
                .with("city", "London"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_mapping_is_consistent() {
        let mapping = order_mapping();
        mapping.validate().unwrap();
        assert_eq!(mapping.entities().count(), 6);
        assert_eq!(
            mapping.get_required_persistent_entity("Address").unwrap().table_name(),
            "shipping_address"
        );
        assert!(mapping
            .persistent_property_path("PurchaseOrder", "lines.adjustments")
            .is_ok());
    }

    #[test]
    fn test_sample_order_has_no_ids() {
        let order = sample_order();
        assert!(order.get("id").is_none());
        let lines = order.get("lines").unwrap().as_list().unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.as_entity().unwrap().get("id").is_none()));
        assert_eq!(order.get("tags").unwrap().as_set().unwrap().len(), 2);
    }
}
