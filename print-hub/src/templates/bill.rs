//! Table bill (addition), printed before payment

use chrono_tz::Tz;
use rust_decimal::Decimal;
use shared::models::{BillData, Document, DocumentKind};
use ticket_printer::{Scale, Section, TextStyle};

use super::{Template, footer, format_datetime, format_money, item_lines, store_header, totals};

#[derive(Debug, Clone, Copy)]
pub struct BillTemplate {
    timezone: Tz,
}

impl BillTemplate {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Template for BillTemplate {
    type Data = BillData;

    fn generate(&self, data: &BillData) -> Document {
        let mut sections = Vec::new();

        store_header(&mut sections, &data.store);
        sections.push(Section::separator('='));
        sections.push(Section::styled(
            "ADDITION",
            TextStyle::default().center().bold().scale(Scale::Double),
        ));
        if let Some(table) = &data.table {
            sections.push(Section::two_column("Table", table));
        }
        if let Some(guests) = data.guests {
            sections.push(Section::two_column("Couverts", guests.to_string()));
        }
        sections.push(Section::two_column(
            "Date",
            format_datetime(data.issued_at, self.timezone),
        ));
        sections.push(Section::separator('-'));

        item_lines(&mut sections, &data.items);
        sections.push(Section::separator('-'));
        totals(
            &mut sections,
            data.subtotal,
            data.discount,
            &data.taxes,
            data.total,
        );

        if let Some(guests) = data.guests.filter(|g| *g > 1) {
            let share = data.total / Decimal::from(guests);
            sections.push(Section::two_column(
                format!("Par personne ({})", guests),
                format_money(share),
            ));
        }

        footer(&mut sections, &data.store);

        let title = match &data.table {
            Some(table) => format!("Addition table {}", table),
            None => "Addition".to_string(),
        };
        Document::new(DocumentKind::Bill, title, sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::fixtures;

    fn bill(guests: Option<u32>) -> BillData {
        BillData {
            store: fixtures::store(),
            table: Some("7".into()),
            guests,
            issued_at: fixtures::at(),
            items: fixtures::items(),
            subtotal: Decimal::new(4300, 2),
            discount: Some(Decimal::new(300, 2)),
            taxes: vec![],
            total: Decimal::new(4000, 2),
        }
    }

    #[test]
    fn test_bill_split_per_guest() {
        let doc = BillTemplate::new(chrono_tz::Europe::Paris).generate(&bill(Some(3)));
        let text = doc.plain_text();
        assert_eq!(doc.kind(), DocumentKind::Bill);
        assert!(text.contains("ADDITION"));
        assert!(text.contains("Couverts 3"));
        assert!(text.contains("Remise -3,00 €"));
        assert!(text.contains("TOTAL 40,00 €"));
        assert!(text.contains("Par personne (3) 13,33 €"));
        assert!(!doc.open_drawer());
    }

    #[test]
    fn test_single_guest_has_no_split() {
        let doc = BillTemplate::new(chrono_tz::Europe::Paris).generate(&bill(Some(1)));
        assert!(!doc.plain_text().contains("Par personne"));
    }
}
