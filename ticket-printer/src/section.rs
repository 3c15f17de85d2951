//! Structured document sections
//!
//! A document is a list of [`Section`]s independent of paper width. The same
//! list is encoded for a 32 or 48 column printer at print time.

use serde::{Deserialize, Serialize};

use crate::error::EncodeResult;
use crate::escpos::{
    Alignment, BarcodeOptions, Emphasis, EncoderConfig, EscPosBuilder, Finish, QrOptions, Scale,
    Symbology,
};

/// Text appearance for one section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    #[serde(default)]
    pub align: Alignment,
    #[serde(default)]
    pub emphasis: Emphasis,
    #[serde(default)]
    pub scale: Scale,
}

impl TextStyle {
    pub fn center(mut self) -> Self {
        self.align = Alignment::Center;
        self
    }

    pub fn right(mut self) -> Self {
        self.align = Alignment::Right;
        self
    }

    pub fn bold(mut self) -> Self {
        self.emphasis.bold = true;
        self
    }

    pub fn underline(mut self) -> Self {
        self.emphasis.underline = true;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.emphasis.inverted = true;
        self
    }

    pub fn scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }
}

fn default_separator() -> char {
    '-'
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Section {
    Text {
        text: String,
        #[serde(default)]
        style: TextStyle,
    },
    Separator {
        #[serde(default = "default_separator")]
        ch: char,
    },
    TwoColumn {
        left: String,
        right: String,
        #[serde(default)]
        style: TextStyle,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        #[serde(default)]
        widths: Option<Vec<usize>>,
    },
    Barcode {
        data: String,
        symbology: Symbology,
        #[serde(default)]
        options: BarcodeOptions,
    },
    QrCode {
        data: String,
        #[serde(default)]
        options: QrOptions,
    },
    Feed {
        lines: u8,
    },
}

impl Section {
    pub fn text(text: impl Into<String>) -> Self {
        Section::Text {
            text: text.into(),
            style: TextStyle::default(),
        }
    }

    pub fn styled(text: impl Into<String>, style: TextStyle) -> Self {
        Section::Text {
            text: text.into(),
            style,
        }
    }

    pub fn separator(ch: char) -> Self {
        Section::Separator { ch }
    }

    pub fn two_column(left: impl Into<String>, right: impl Into<String>) -> Self {
        Section::TwoColumn {
            left: left.into(),
            right: right.into(),
            style: TextStyle::default(),
        }
    }

    pub fn two_column_styled(
        left: impl Into<String>,
        right: impl Into<String>,
        style: TextStyle,
    ) -> Self {
        Section::TwoColumn {
            left: left.into(),
            right: right.into(),
            style,
        }
    }

    pub fn feed(lines: u8) -> Self {
        Section::Feed { lines }
    }

    /// Plain text carried by the section, used for previews and logs
    pub fn plain_text(&self) -> Option<String> {
        match self {
            Section::Text { text, .. } => Some(text.clone()),
            Section::TwoColumn { left, right, .. } => Some(format!("{} {}", left, right)),
            Section::Table { headers, rows, .. } => {
                let mut out = headers.join(" ");
                for row in rows {
                    out.push('\n');
                    out.push_str(&row.join(" "));
                }
                Some(out)
            }
            _ => None,
        }
    }
}

/// Encode a section list into one ESC/POS buffer.
///
/// Pure: identical input always yields identical bytes.
pub fn encode(sections: &[Section], config: &EncoderConfig, finish: Finish) -> EncodeResult<Vec<u8>> {
    let mut b = EscPosBuilder::with_config(config);
    for section in sections {
        match section {
            Section::Text { text, style } => {
                apply_style(&mut b, style);
                b.append_line(text);
            }
            Section::Separator { ch } => {
                b.reset_style();
                b.append_separator_line(*ch);
            }
            Section::TwoColumn { left, right, style } => {
                // flush-right layout ignores alignment
                apply_style(&mut b, &TextStyle {
                    align: Alignment::Left,
                    ..*style
                });
                b.append_two_column_line(left, right);
            }
            Section::Table {
                headers,
                rows,
                widths,
            } => {
                b.reset_style();
                b.append_table(headers, rows, widths.as_deref())?;
            }
            Section::Barcode {
                data,
                symbology,
                options,
            } => {
                b.reset_style();
                b.set_alignment(Alignment::Center);
                b.append_barcode(data, *symbology, *options)?;
                b.set_alignment(Alignment::Left);
            }
            Section::QrCode { data, options } => {
                b.reset_style();
                b.set_alignment(Alignment::Center);
                b.append_qr_code(data, *options)?;
                b.set_alignment(Alignment::Left);
            }
            Section::Feed { lines } => {
                b.feed(*lines);
            }
        }
    }
    Ok(b.finalize(finish))
}

fn apply_style(b: &mut EscPosBuilder, style: &TextStyle) {
    b.set_alignment(style.align)
        .set_emphasis(style.emphasis)
        .set_scale(style.scale);
}
