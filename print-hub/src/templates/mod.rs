//! Document templates
//!
//! Each template maps domain data (receipt, kitchen order, bill, test page)
//! to a width-independent [`Document`]. Templates do no I/O and read every
//! printed time from their data, so the same data always yields the same
//! sections; only the document envelope (id, creation time) is stamped per
//! call. Paper width and charset are applied later by [`render`].

mod bill;
mod kitchen;
mod receipt;
mod test_page;

pub use bill::BillTemplate;
pub use kitchen::KitchenTemplate;
pub use receipt::ReceiptTemplate;
pub use test_page::{TestPageData, TestPageTemplate};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};
use shared::models::{Document, LineItem, PrinterProfile, StoreInfo, TaxLine};
use ticket_printer::{EncodeResult, Finish, Scale, Section, TextStyle};

/// Map domain data to a document
pub trait Template {
    type Data;

    fn generate(&self, data: &Self::Data) -> Document;
}

/// All templates sharing one display timezone
#[derive(Debug, Clone, Copy)]
pub struct Templates {
    pub receipt: ReceiptTemplate,
    pub kitchen: KitchenTemplate,
    pub bill: BillTemplate,
    pub test_page: TestPageTemplate,
}

impl Templates {
    pub fn new(timezone: Tz) -> Self {
        Self {
            receipt: ReceiptTemplate::new(timezone),
            kitchen: KitchenTemplate::new(timezone),
            bill: BillTemplate::new(timezone),
            test_page: TestPageTemplate::new(timezone),
        }
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new(chrono_tz::Europe::Paris)
    }
}

/// Encode a document for one printer profile.
///
/// Drawer pulse and beep are only emitted when both the document asks for
/// them and the printer has the hardware.
pub fn render(document: &Document, profile: &PrinterProfile) -> EncodeResult<Vec<u8>> {
    let finish = Finish {
        cut: profile.cut,
        open_drawer: document.open_drawer() && profile.cash_drawer,
        beep: document.beep() && profile.beep,
    };
    ticket_printer::encode(document.sections(), &profile.encoder_config(), finish)
}

// ========== Shared building blocks ==========

/// `12,50 €`
pub(crate) fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2} €", rounded).replace('.', ",")
}

pub(crate) fn format_datetime(at: DateTime<Utc>, timezone: Tz) -> String {
    at.with_timezone(&timezone).format("%d/%m/%Y %H:%M").to_string()
}

pub(crate) fn format_time(at: DateTime<Utc>, timezone: Tz) -> String {
    at.with_timezone(&timezone).format("%H:%M").to_string()
}

pub(crate) fn store_header(sections: &mut Vec<Section>, store: &StoreInfo) {
    if !store.name.is_empty() {
        sections.push(Section::styled(
            &store.name,
            TextStyle::default().center().bold().scale(Scale::Double),
        ));
    }
    for line in store.address.lines().filter(|l| !l.trim().is_empty()) {
        sections.push(Section::styled(line.trim(), TextStyle::default().center()));
    }
    if let Some(phone) = &store.phone {
        sections.push(Section::styled(format!("Tél: {}", phone), TextStyle::default().center()));
    }
    if let Some(tax_id) = &store.tax_id {
        sections.push(Section::styled(format!("SIRET: {}", tax_id), TextStyle::default().center()));
    }
}

pub(crate) fn item_lines(sections: &mut Vec<Section>, items: &[LineItem]) {
    for item in items {
        sections.push(Section::two_column(
            format!("{} x {}", item.quantity, item.name),
            format_money(item.line_total()),
        ));
        for modifier in &item.modifiers {
            sections.push(Section::text(format!("   + {}", modifier)));
        }
        if let Some(note) = item.note.as_deref().filter(|n| !n.trim().is_empty()) {
            sections.push(Section::text(format!("   * {}", note)));
        }
    }
}

pub(crate) fn totals(
    sections: &mut Vec<Section>,
    subtotal: Decimal,
    discount: Option<Decimal>,
    taxes: &[TaxLine],
    total: Decimal,
) {
    sections.push(Section::two_column("Sous-total", format_money(subtotal)));
    if let Some(discount) = discount.filter(|d| !d.is_zero()) {
        sections.push(Section::two_column(
            "Remise",
            format!("-{}", format_money(discount.abs())),
        ));
    }
    for tax in taxes {
        sections.push(Section::two_column(&tax.label, format_money(tax.amount)));
    }
    sections.push(Section::separator('='));
    sections.push(Section::two_column_styled(
        "TOTAL",
        format_money(total),
        TextStyle::default().bold().scale(Scale::DoubleHeight),
    ));
}

pub(crate) fn footer(sections: &mut Vec<Section>, store: &StoreInfo) {
    if let Some(footer) = store.footer.as_deref().filter(|f| !f.trim().is_empty()) {
        sections.push(Section::feed(1));
        sections.push(Section::styled(footer, TextStyle::default().center()));
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use shared::models::*;

    pub fn store() -> StoreInfo {
        StoreInfo {
            name: "Chez Paul".into(),
            address: "12 rue des Lilas\n75011 Paris".into(),
            tax_id: Some("812 345 678 00019".into()),
            phone: Some("01 23 45 67 89".into()),
            footer: Some("Merci de votre visite".into()),
        }
    }

    pub fn at() -> chrono::DateTime<chrono::Utc> {
        // 14:32 in Paris (winter time)
        chrono::Utc.with_ymd_and_hms(2026, 1, 22, 13, 32, 15).unwrap()
    }

    pub fn items() -> Vec<LineItem> {
        let mut steak = LineItem::new("Steak frites", 2, Decimal::new(1850, 2));
        steak.modifiers = vec!["Saignant".into()];
        steak.category = Some("Plats".into());
        let mut wine = LineItem::new("Verre de vin", 1, Decimal::new(600, 2));
        wine.category = Some("Boissons".into());
        vec![steak, wine]
    }

    pub fn receipt() -> ReceiptData {
        ReceiptData {
            store: store(),
            order_number: "1042".into(),
            table: Some("12".into()),
            cashier: Some("Marie".into()),
            issued_at: at(),
            items: items(),
            subtotal: Decimal::new(4300, 2),
            discount: None,
            taxes: vec![TaxLine {
                label: "TVA 10%".into(),
                amount: Decimal::new(391, 2),
            }],
            total: Decimal::new(4300, 2),
            tenders: vec![Tender {
                method: TenderMethod::Cash,
                amount: Decimal::new(5000, 2),
            }],
            change: Some(Decimal::new(700, 2)),
            qr_payload: None,
            barcode: None,
        }
    }

    pub fn kitchen_order() -> KitchenOrderData {
        let mut steak = KitchenItem::new("Steak frites", 2, Some("Plats"));
        steak.modifiers = vec!["Saignant".into()];
        let mut tartare = KitchenItem::new("Tartare", 1, Some("Plats"));
        tartare.urgent = true;
        KitchenOrderData {
            order_number: "1042".into(),
            table: Some("12".into()),
            server: Some("Luc".into()),
            ordered_at: at(),
            items: vec![
                KitchenItem::new("Pain", 1, None),
                steak,
                KitchenItem::new("Bière pression", 2, Some("Boissons")),
                tartare,
                KitchenItem::new("Salade", 1, Some("Entrées")),
            ],
            urgent: false,
            note: Some("Allergie noix".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{DocumentKind, PaperWidth};
    use ticket_printer::Charset;

    #[test]
    fn test_same_data_yields_same_sections() {
        let templates = Templates::default();

        let first = templates.receipt.generate(&fixtures::receipt());
        let second = templates.receipt.generate(&fixtures::receipt());
        assert_eq!(first.sections(), second.sections());
        assert_ne!(first.id(), second.id());

        let first = templates.kitchen.generate(&fixtures::kitchen_order());
        let second = templates.kitchen.generate(&fixtures::kitchen_order());
        assert_eq!(first.sections(), second.sections());
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(Decimal::new(1250, 2)), "12,50 €");
        assert_eq!(format_money(Decimal::new(7, 0)), "7,00 €");
        assert_eq!(format_money(Decimal::new(12345, 3)), "12,35 €");
    }

    #[test]
    fn test_format_datetime_uses_timezone() {
        let at = fixtures::at();
        assert_eq!(format_datetime(at, chrono_tz::Europe::Paris), "22/01/2026 14:32");
        assert_eq!(format_time(at, chrono_tz::UTC), "13:32");
    }

    #[test]
    fn test_render_honours_hardware() {
        let doc = Document::new(DocumentKind::Receipt, "r", vec![Section::text("x")])
            .with_drawer(true)
            .with_beep(true);

        let without = PrinterProfile {
            paper_width: PaperWidth::Mm58,
            charset: Charset::Pc437,
            cut: false,
            cash_drawer: false,
            beep: false,
        };
        let bytes = render(&doc, &without).unwrap();
        assert!(!bytes.windows(3).any(|w| w == [0x1B, b'p', 0x00]));
        assert!(!bytes.windows(2).any(|w| w == [0x1B, b'B']));

        let with = PrinterProfile {
            cash_drawer: true,
            beep: true,
            ..without
        };
        let bytes = render(&doc, &with).unwrap();
        assert!(bytes.windows(3).any(|w| w == [0x1B, b'p', 0x00]));
        assert!(bytes.windows(2).any(|w| w == [0x1B, b'B']));
    }
}
