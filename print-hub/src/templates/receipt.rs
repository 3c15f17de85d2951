//! Customer receipt

use chrono_tz::Tz;
use shared::models::{Document, DocumentKind, ReceiptData, TenderMethod};
use ticket_printer::{BarcodeOptions, QrOptions, Scale, Section, Symbology, TextStyle};

use super::{Template, footer, format_datetime, format_money, item_lines, store_header, totals};

#[derive(Debug, Clone, Copy)]
pub struct ReceiptTemplate {
    timezone: Tz,
}

impl ReceiptTemplate {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Template for ReceiptTemplate {
    type Data = ReceiptData;

    fn generate(&self, data: &ReceiptData) -> Document {
        let mut sections = Vec::new();

        store_header(&mut sections, &data.store);
        sections.push(Section::separator('='));
        sections.push(Section::styled(
            "TICKET",
            TextStyle::default().center().bold().scale(Scale::DoubleHeight),
        ));
        sections.push(Section::two_column("Commande", format!("#{}", data.order_number)));
        sections.push(Section::two_column(
            "Date",
            format_datetime(data.issued_at, self.timezone),
        ));
        if let Some(table) = &data.table {
            sections.push(Section::two_column("Table", table));
        }
        if let Some(cashier) = &data.cashier {
            sections.push(Section::two_column("Caissier", cashier));
        }
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

        if !data.tenders.is_empty() {
            sections.push(Section::separator('-'));
            for tender in &data.tenders {
                sections.push(Section::two_column(
                    tender.method.label(),
                    format_money(tender.amount),
                ));
            }
        }
        if let Some(change) = data.change.filter(|c| !c.is_zero()) {
            sections.push(Section::two_column_styled(
                "Rendu",
                format_money(change),
                TextStyle::default().bold(),
            ));
        }

        footer(&mut sections, &data.store);

        if let Some(payload) = data.qr_payload.as_deref().filter(|p| !p.is_empty()) {
            sections.push(Section::feed(1));
            sections.push(Section::QrCode {
                data: payload.to_string(),
                options: QrOptions::default(),
            });
        }
        if let Some(code) = data.barcode.as_deref().filter(|c| !c.is_empty()) {
            sections.push(Section::feed(1));
            sections.push(Section::Barcode {
                data: code.to_string(),
                symbology: Symbology::Code128,
                options: BarcodeOptions::default(),
            });
        }

        let paid_cash = data
            .tenders
            .iter()
            .any(|t| t.method == TenderMethod::Cash);

        Document::new(
            DocumentKind::Receipt,
            format!("Ticket #{}", data.order_number),
            sections,
        )
        .with_drawer(paid_cash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{fixtures, render};
    use shared::models::{PaperWidth, PrinterProfile, Tender};
    use ticket_printer::Charset;

    fn template() -> ReceiptTemplate {
        ReceiptTemplate::new(chrono_tz::Europe::Paris)
    }

    #[test]
    fn test_receipt_content() {
        let doc = template().generate(&fixtures::receipt());
        let text = doc.plain_text();

        assert_eq!(doc.kind(), DocumentKind::Receipt);
        assert!(text.contains("Chez Paul"));
        assert!(text.contains("Commande #1042"));
        assert!(text.contains("22/01/2026 14:32"));
        assert!(text.contains("2 x Steak frites 37,00 €"));
        assert!(text.contains("   + Saignant"));
        assert!(text.contains("TVA 10% 3,91 €"));
        assert!(text.contains("TOTAL 43,00 €"));
        assert!(text.contains("Espèces 50,00 €"));
        assert!(text.contains("Rendu 7,00 €"));
        assert!(text.contains("Merci de votre visite"));
    }

    #[test]
    fn test_cash_opens_drawer() {
        let doc = template().generate(&fixtures::receipt());
        assert!(doc.open_drawer());

        let mut card = fixtures::receipt();
        card.tenders = vec![Tender {
            method: TenderMethod::Card,
            amount: card.total,
        }];
        card.change = None;
        let doc = template().generate(&card);
        assert!(!doc.open_drawer());
        assert!(!doc.plain_text().contains("Rendu"));
    }

    #[test]
    fn test_codes_are_appended() {
        let mut data = fixtures::receipt();
        data.qr_payload = Some("https://r.example/1042".into());
        data.barcode = Some("1042".into());
        let doc = template().generate(&data);

        let sections = doc.sections();
        assert!(matches!(sections[sections.len() - 3], Section::QrCode { .. }));
        assert!(matches!(sections.last(), Some(Section::Barcode { .. })));

        let profile = PrinterProfile {
            paper_width: PaperWidth::Mm58,
            charset: Charset::Pc858,
            ..PrinterProfile::default()
        };
        assert!(render(&doc, &profile).is_ok());
    }

    #[test]
    fn test_generation_is_pure() {
        let data = fixtures::receipt();
        let a = template().generate(&data);
        let b = template().generate(&data);
        assert_eq!(a.sections(), b.sections());
    }
}
