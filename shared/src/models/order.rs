//! Order data consumed by the document templates

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Store header printed on customer-facing tickets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    /// Tax identification number (NIF / SIRET)
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    /// Footer line, e.g. "Merci de votre visite"
    pub footer: Option<String>,
}

/// One billed line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    /// Overrides `quantity × unit_price` when the POS already computed it
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub note: Option<String>,
    pub category: Option<String>,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_price,
            total: None,
            modifiers: Vec::new(),
            note: None,
            category: None,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.total
            .unwrap_or_else(|| self.unit_price * Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLine {
    /// e.g. "TVA 10%"
    pub label: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderMethod {
    Cash,
    Card,
    Voucher,
    Other,
}

impl TenderMethod {
    pub fn label(self) -> &'static str {
        match self {
            TenderMethod::Cash => "Espèces",
            TenderMethod::Card => "Carte",
            TenderMethod::Voucher => "Ticket resto",
            TenderMethod::Other => "Autre",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tender {
    pub method: TenderMethod,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptData {
    #[serde(default)]
    pub store: StoreInfo,
    pub order_number: String,
    pub table: Option<String>,
    pub cashier: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub items: Vec<LineItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub taxes: Vec<TaxLine>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(default)]
    pub tenders: Vec<Tender>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub change: Option<Decimal>,
    /// Encoded as a QR code at the bottom (e.g. e-receipt link)
    pub qr_payload: Option<String>,
    /// Encoded as a CODE128 barcode (e.g. order lookup)
    pub barcode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitchenItem {
    pub name: String,
    pub quantity: u32,
    pub category: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub note: Option<String>,
    #[serde(default)]
    pub urgent: bool,
}

impl KitchenItem {
    pub fn new(name: impl Into<String>, quantity: u32, category: Option<&str>) -> Self {
        Self {
            name: name.into(),
            quantity,
            category: category.map(str::to_string),
            modifiers: Vec::new(),
            note: None,
            urgent: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitchenOrderData {
    pub order_number: String,
    pub table: Option<String>,
    pub server: Option<String>,
    pub ordered_at: DateTime<Utc>,
    pub items: Vec<KitchenItem>,
    #[serde(default)]
    pub urgent: bool,
    pub note: Option<String>,
}

impl KitchenOrderData {
    /// Same order header restricted to a subset of its items
    pub fn with_items(&self, items: Vec<KitchenItem>) -> Self {
        Self {
            order_number: self.order_number.clone(),
            table: self.table.clone(),
            server: self.server.clone(),
            ordered_at: self.ordered_at,
            items,
            urgent: self.urgent,
            note: self.note.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillData {
    #[serde(default)]
    pub store: StoreInfo,
    pub table: Option<String>,
    pub guests: Option<u32>,
    pub issued_at: DateTime<Utc>,
    pub items: Vec<LineItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub taxes: Vec<TaxLine>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total() {
        let item = LineItem::new("Café", 3, Decimal::new(180, 2));
        assert_eq!(item.line_total(), Decimal::new(540, 2));

        let mut overridden = item.clone();
        overridden.total = Some(Decimal::new(500, 2));
        assert_eq!(overridden.line_total(), Decimal::new(500, 2));
    }

    #[test]
    fn test_kitchen_item_json() {
        let json = r#"{"name":"Steak","quantity":2,"category":"Plats"}"#;
        let item: KitchenItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.category.as_deref(), Some("Plats"));
        assert!(!item.urgent);
        assert!(item.modifiers.is_empty());
    }
}
