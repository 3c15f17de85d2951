//! Kitchen ticket
//!
//! Items are grouped by category (alphabetical, uncategorized bucket last)
//! so each station reads its block at a glance. Urgent items are printed
//! enlarged.

use chrono_tz::Tz;
use shared::models::{Document, DocumentKind, KitchenItem, KitchenOrderData, Priority};
use std::collections::BTreeMap;
use ticket_printer::{Scale, Section, TextStyle};

use super::{Template, format_time};

/// Label of the bucket holding items without a category
pub const UNCATEGORIZED_LABEL: &str = "Divers";

#[derive(Debug, Clone, Copy)]
pub struct KitchenTemplate {
    timezone: Tz,
}

impl KitchenTemplate {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Group items by category: named categories in alphabetical order
    /// (case-insensitive), then the uncategorized bucket. Item order inside
    /// a group follows the order.
    pub fn group_by_category(items: &[KitchenItem]) -> Vec<(Option<&str>, Vec<&KitchenItem>)> {
        let mut named: BTreeMap<String, (&str, Vec<&KitchenItem>)> = BTreeMap::new();
        let mut uncategorized = Vec::new();

        for item in items {
            match item.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                Some(category) => {
                    named
                        .entry(category.to_lowercase())
                        .or_insert_with(|| (category, Vec::new()))
                        .1
                        .push(item);
                }
                None => uncategorized.push(item),
            }
        }

        let mut groups: Vec<(Option<&str>, Vec<&KitchenItem>)> = named
            .into_values()
            .map(|(label, items)| (Some(label), items))
            .collect();
        if !uncategorized.is_empty() {
            groups.push((None, uncategorized));
        }
        groups
    }

    fn render_item(sections: &mut Vec<Section>, item: &KitchenItem) {
        let line = format!("{} x {}", item.quantity, item.name);
        if item.urgent {
            sections.push(Section::styled(
                format!("!! {}", line),
                TextStyle::default().bold().scale(Scale::Double),
            ));
        } else {
            sections.push(Section::styled(
                line,
                TextStyle::default().scale(Scale::DoubleHeight),
            ));
        }

        for modifier in &item.modifiers {
            sections.push(Section::text(format!("   - {}", modifier)));
        }
        if let Some(note) = item.note.as_deref().filter(|n| !n.trim().is_empty()) {
            sections.push(Section::styled(
                format!("   * {}", note),
                TextStyle::default().bold(),
            ));
        }
    }
}

impl Template for KitchenTemplate {
    type Data = KitchenOrderData;

    fn generate(&self, data: &KitchenOrderData) -> Document {
        let mut sections = Vec::new();

        // Header
        if data.urgent {
            sections.push(Section::styled(
                "*** URGENT ***",
                TextStyle::default().center().bold().inverted().scale(Scale::Double),
            ));
        }
        let table = data
            .table
            .as_deref()
            .map(|t| format!("Table {}", t))
            .unwrap_or_else(|| "A emporter".to_string());
        sections.push(Section::styled(
            table,
            TextStyle::default().center().bold().scale(Scale::Double),
        ));
        sections.push(Section::two_column("Commande", format!("#{}", data.order_number)));
        if let Some(server) = &data.server {
            sections.push(Section::two_column("Serveur", server));
        }
        sections.push(Section::two_column(
            "Heure",
            format_time(data.ordered_at, self.timezone),
        ));
        sections.push(Section::separator('='));

        // Body
        for (category, items) in Self::group_by_category(&data.items) {
            sections.push(Section::styled(
                format!("[{}]", category.unwrap_or(UNCATEGORIZED_LABEL)),
                TextStyle::default().bold().underline(),
            ));
            for item in items {
                Self::render_item(&mut sections, item);
            }
            sections.push(Section::separator('-'));
        }

        if let Some(note) = data.note.as_deref().filter(|n| !n.trim().is_empty()) {
            sections.push(Section::styled(
                format!("NOTE: {}", note),
                TextStyle::default().bold(),
            ));
        }

        let priority = if data.urgent {
            Priority::Urgent
        } else {
            Priority::Normal
        };
        Document::new(
            DocumentKind::KitchenOrder,
            format!("Cuisine #{}", data.order_number),
            sections,
        )
        .with_priority(priority)
        .with_beep(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::fixtures;

    fn template() -> KitchenTemplate {
        KitchenTemplate::new(chrono_tz::Europe::Paris)
    }

    #[test]
    fn test_grouping_order() {
        let order = fixtures::kitchen_order();
        let groups = KitchenTemplate::group_by_category(&order.items);
        let labels: Vec<_> = groups.iter().map(|(label, _)| *label).collect();
        assert_eq!(
            labels,
            vec![Some("Boissons"), Some("Entrées"), Some("Plats"), None]
        );

        let plats = &groups[2].1;
        assert_eq!(plats.len(), 2);
        assert_eq!(plats[0].name, "Steak frites");
        assert_eq!(plats[1].name, "Tartare");
    }

    #[test]
    fn test_grouping_is_case_insensitive() {
        let items = vec![
            KitchenItem::new("A", 1, Some("plats")),
            KitchenItem::new("B", 1, Some("Plats ")),
        ];
        let groups = KitchenTemplate::group_by_category(&items);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn test_urgent_items_are_enlarged() {
        let doc = template().generate(&fixtures::kitchen_order());
        let urgent = doc
            .sections()
            .iter()
            .find_map(|s| match s {
                Section::Text { text, style } if text.contains("Tartare") => Some((text, style)),
                _ => None,
            })
            .unwrap();
        assert!(urgent.0.starts_with("!! "));
        assert_eq!(urgent.1.scale, Scale::Double);
        assert!(doc.beep());
    }

    #[test]
    fn test_urgent_order_banner_and_priority() {
        let mut order = fixtures::kitchen_order();
        let doc = template().generate(&order);
        assert_eq!(doc.priority(), Priority::Normal);
        assert!(!doc.plain_text().contains("URGENT"));

        order.urgent = true;
        let doc = template().generate(&order);
        assert_eq!(doc.priority(), Priority::Urgent);
        assert!(doc.plain_text().starts_with("*** URGENT ***"));
    }

    #[test]
    fn test_header_and_note() {
        let doc = template().generate(&fixtures::kitchen_order());
        let text = doc.plain_text();
        assert!(text.contains("Table 12"));
        assert!(text.contains("Heure 14:32"));
        assert!(text.contains("[Divers]"));
        assert!(text.contains("NOTE: Allergie noix"));
    }
}
