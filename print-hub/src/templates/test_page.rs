//! Calibration page printed by "test printer"

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use shared::models::{Document, DocumentKind, PrinterEndpoint, Priority};
use ticket_printer::{Scale, Section, TextStyle};

use super::{Template, format_datetime};

#[derive(Debug, Clone)]
pub struct TestPageData {
    pub printer: PrinterEndpoint,
    pub printed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct TestPageTemplate {
    timezone: Tz,
}

impl TestPageTemplate {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Template for TestPageTemplate {
    type Data = TestPageData;

    fn generate(&self, data: &TestPageData) -> Document {
        let printer = &data.printer;
        let profile = &printer.profile;

        let sections = vec![
            Section::styled(
                "TEST PAGE",
                TextStyle::default().center().bold().scale(Scale::Double),
            ),
            Section::separator('='),
            Section::two_column("Printer", &printer.name),
            Section::two_column("Address", printer.address()),
            Section::two_column("Role", printer.role.to_string()),
            Section::two_column(
                "Paper",
                format!("{} columns", profile.paper_width.columns()),
            ),
            Section::two_column("Charset", profile.charset.to_string()),
            Section::two_column("Date", format_datetime(data.printed_at, self.timezone)),
            Section::separator('-'),
            Section::styled("Left", TextStyle::default()),
            Section::styled("Center", TextStyle::default().center()),
            Section::styled("Right", TextStyle::default().right()),
            Section::styled("Bold", TextStyle::default().bold()),
            Section::styled("Underline", TextStyle::default().underline()),
            Section::styled("Inverted", TextStyle::default().inverted()),
            Section::styled("Double", TextStyle::default().scale(Scale::Double)),
            Section::separator('-'),
            Section::Table {
                headers: vec!["Qty".into(), "Item".into(), "Price".into()],
                rows: vec![
                    vec!["1".into(), "Café crème".into(), "2,80 €".into()],
                    vec!["2".into(), "Crêpe".into(), "9,00 €".into()],
                ],
                widths: None,
            },
            Section::separator('-'),
            Section::text("Accents: é è à ç ô ß €"),
            Section::separator('='),
        ];

        Document::new(
            DocumentKind::TestPage,
            format!("Test {}", printer.name),
            sections,
        )
        .with_priority(Priority::High)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{fixtures, render};
    use shared::models::{PaperWidth, PrinterInput, PrinterRole};

    #[test]
    fn test_page_renders_on_both_widths() {
        let mut printer = PrinterEndpoint::from_input(PrinterInput::new(
            "Bar",
            "192.168.1.40",
            PrinterRole::Bar,
        ));
        let template = TestPageTemplate::new(chrono_tz::Europe::Paris);

        for width in [PaperWidth::Mm58, PaperWidth::Mm80] {
            printer.profile.paper_width = width;
            let doc = template.generate(&TestPageData {
                printer: printer.clone(),
                printed_at: fixtures::at(),
            });
            assert!(doc.plain_text().contains("Address 192.168.1.40:9100"));
            assert!(render(&doc, &printer.profile).is_ok());
        }
    }
}
