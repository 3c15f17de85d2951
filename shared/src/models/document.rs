//! Document Model
//!
//! A document is built once by a template and never modified afterwards;
//! fields are only reachable through getters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ticket_printer::Section;

/// Job priority. Ordering follows declaration order (`Low < Urgent`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Receipt,
    KitchenOrder,
    Bill,
    TestPage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    kind: DocumentKind,
    title: String,
    sections: Vec<Section>,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    open_drawer: bool,
    #[serde(default)]
    beep: bool,
    created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(kind: DocumentKind, title: impl Into<String>, sections: Vec<Section>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            sections,
            priority: Priority::Normal,
            open_drawer: false,
            beep: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Ask for a drawer pulse (honoured only if the printer has a drawer)
    pub fn with_drawer(mut self, open: bool) -> Self {
        self.open_drawer = open;
        self
    }

    /// Ask for a beep (honoured only if the printer has a buzzer)
    pub fn with_beep(mut self, beep: bool) -> Self {
        self.beep = beep;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn open_drawer(&self) -> bool {
        self.open_drawer
    }

    pub fn beep(&self) -> bool {
        self.beep
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Plain text of every text-bearing section, one per line
    pub fn plain_text(&self) -> String {
        self.sections
            .iter()
            .filter_map(Section::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
