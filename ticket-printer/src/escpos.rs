//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data. The builder owns
//! its buffer; callers can only append and finally [`EscPosBuilder::finalize`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::encoding::{Charset, pad_to_width, truncate_to_width};
use crate::error::{EncodeError, EncodeResult};

pub(crate) const ESC: u8 = 0x1B;
pub(crate) const GS: u8 = 0x1D;

/// Common widths:
/// - 58mm paper: 32 characters
/// - 80mm paper: 48 characters
pub const NARROW_COLUMNS: usize = 32;
pub const WIDE_COLUMNS: usize = 48;

/// Largest payload accepted by QR model 2 in byte mode
const QR_MAX_PAYLOAD: usize = 7089;

/// Encoder parameters taken from the target printer profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    pub columns: usize,
    pub charset: Charset,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            columns: WIDE_COLUMNS,
            charset: Charset::default(),
        }
    }
}

/// End-of-document hardware actions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Finish {
    pub cut: bool,
    pub open_drawer: bool,
    pub beep: bool,
}

impl Finish {
    pub fn cut() -> Self {
        Self {
            cut: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    fn code(self) -> u8 {
        match self {
            Alignment::Left => 0x00,
            Alignment::Center => 0x01,
            Alignment::Right => 0x02,
        }
    }
}

/// Character emphasis flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Emphasis {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub inverted: bool,
}

impl Emphasis {
    pub const NONE: Emphasis = Emphasis {
        bold: false,
        underline: false,
        inverted: false,
    };

    pub const BOLD: Emphasis = Emphasis {
        bold: true,
        underline: false,
        inverted: false,
    };
}

/// Character scale (GS !)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    #[default]
    Normal,
    DoubleHeight,
    DoubleWidth,
    Double,
    Triple,
}

impl Scale {
    fn size_byte(self) -> u8 {
        match self {
            Scale::Normal => 0x00,
            Scale::DoubleHeight => 0x01,
            Scale::DoubleWidth => 0x10,
            Scale::Double => 0x11,
            Scale::Triple => 0x22,
        }
    }

    /// Horizontal magnification; a line holds `columns / width_factor` chars
    pub fn width_factor(self) -> usize {
        match self {
            Scale::Normal | Scale::DoubleHeight => 1,
            Scale::DoubleWidth | Scale::Double => 2,
            Scale::Triple => 3,
        }
    }
}

/// Supported 1D barcode symbologies (GS k, function B)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symbology {
    UpcA,
    UpcE,
    Ean13,
    Ean8,
    Code39,
    Itf,
    Codabar,
    Code93,
    Code128,
}

impl Symbology {
    fn code(self) -> u8 {
        match self {
            Symbology::UpcA => 65,
            Symbology::UpcE => 66,
            Symbology::Ean13 => 67,
            Symbology::Ean8 => 68,
            Symbology::Code39 => 69,
            Symbology::Itf => 70,
            Symbology::Codabar => 71,
            Symbology::Code93 => 72,
            Symbology::Code128 => 73,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Symbology::UpcA => "UPC-A",
            Symbology::UpcE => "UPC-E",
            Symbology::Ean13 => "EAN13",
            Symbology::Ean8 => "EAN8",
            Symbology::Code39 => "CODE39",
            Symbology::Itf => "ITF",
            Symbology::Codabar => "CODABAR",
            Symbology::Code93 => "CODE93",
            Symbology::Code128 => "CODE128",
        }
    }

    /// Validate barcode content and return the payload bytes to send
    fn payload(self, data: &str) -> EncodeResult<Vec<u8>> {
        let invalid = |reason: &str| EncodeError::InvalidBarcode {
            symbology: self.name(),
            reason: reason.to_string(),
        };
        let digits_only = !data.is_empty() && data.bytes().all(|b| b.is_ascii_digit());

        match self {
            Symbology::UpcA | Symbology::UpcE | Symbology::Ean13 | Symbology::Ean8 => {
                let allowed: &[usize] = match self {
                    Symbology::UpcA => &[11, 12],
                    Symbology::UpcE => &[6, 7, 8, 11, 12],
                    Symbology::Ean13 => &[12, 13],
                    _ => &[7, 8],
                };
                if !digits_only {
                    return Err(invalid("digits only"));
                }
                if !allowed.contains(&data.len()) {
                    return Err(invalid(&format!("length {} not allowed", data.len())));
                }
                Ok(data.as_bytes().to_vec())
            }
            Symbology::Itf => {
                if !digits_only || data.len() % 2 != 0 {
                    return Err(invalid("even number of digits required"));
                }
                Ok(data.as_bytes().to_vec())
            }
            Symbology::Code39 => {
                let ok = data
                    .bytes()
                    .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase() || b" -.$/+%*".contains(&b));
                if data.is_empty() || !ok {
                    return Err(invalid("0-9, A-Z and -.$/+% only"));
                }
                Ok(data.as_bytes().to_vec())
            }
            Symbology::Codabar => {
                let ok = data
                    .bytes()
                    .all(|b| b.is_ascii_digit() || b"-$:/.+ABCDabcd".contains(&b));
                if data.is_empty() || !ok {
                    return Err(invalid("0-9, A-D and -$:/.+ only"));
                }
                Ok(data.as_bytes().to_vec())
            }
            Symbology::Code93 => {
                if data.is_empty() || !data.is_ascii() {
                    return Err(invalid("ASCII only"));
                }
                Ok(data.as_bytes().to_vec())
            }
            Symbology::Code128 => {
                if data.is_empty() || !data.bytes().all(|b| (0x20..0x7F).contains(&b)) {
                    return Err(invalid("printable ASCII only"));
                }
                // Code set B unless the caller selected one
                let mut payload = Vec::with_capacity(data.len() + 2);
                if !data.starts_with('{') {
                    payload.extend_from_slice(b"{B");
                }
                payload.extend_from_slice(data.as_bytes());
                Ok(payload)
            }
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Symbology {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_uppercase().replace(['-', '_', ' '], "");
        match norm.as_str() {
            "UPCA" => Ok(Symbology::UpcA),
            "UPCE" => Ok(Symbology::UpcE),
            "EAN13" | "JAN13" => Ok(Symbology::Ean13),
            "EAN8" | "JAN8" => Ok(Symbology::Ean8),
            "CODE39" => Ok(Symbology::Code39),
            "ITF" => Ok(Symbology::Itf),
            "CODABAR" | "NW7" => Ok(Symbology::Codabar),
            "CODE93" => Ok(Symbology::Code93),
            "CODE128" => Ok(Symbology::Code128),
            _ => Err(EncodeError::UnknownSymbology(s.to_string())),
        }
    }
}

/// Human readable interpretation position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HriPosition {
    None,
    Above,
    #[default]
    Below,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarcodeOptions {
    /// Height in dots (1-255)
    pub height: u8,
    /// Module width (2-6)
    pub module_width: u8,
    pub hri: HriPosition,
}

impl Default for BarcodeOptions {
    fn default() -> Self {
        Self {
            height: 80,
            module_width: 3,
            hri: HriPosition::Below,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QrErrorCorrection {
    #[default]
    L,
    M,
    Q,
    H,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QrOptions {
    /// Module size in dots (1-16)
    pub size: u8,
    pub error_correction: QrErrorCorrection,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            size: 6,
            error_correction: QrErrorCorrection::L,
        }
    }
}

/// Column widths for a table.
///
/// Without explicit widths every column gets `total / n` and the last column
/// absorbs the rounding residue, so the widths always sum to `total`.
pub fn column_widths(
    total: usize,
    columns: usize,
    explicit: Option<&[usize]>,
) -> EncodeResult<Vec<usize>> {
    if columns == 0 {
        return Err(EncodeError::EmptyTable);
    }
    if let Some(widths) = explicit {
        if widths.len() != columns {
            return Err(EncodeError::InvalidWidths(format!(
                "{} widths for {} columns",
                widths.len(),
                columns
            )));
        }
        if widths.contains(&0) {
            return Err(EncodeError::InvalidWidths("zero-width column".into()));
        }
        let sum: usize = widths.iter().sum();
        if sum > total {
            return Err(EncodeError::InvalidWidths(format!(
                "widths sum to {} but the line holds {}",
                sum, total
            )));
        }
        return Ok(widths.to_vec());
    }
    if columns > total {
        return Err(EncodeError::InvalidWidths(format!(
            "{} columns do not fit in {}",
            columns, total
        )));
    }
    let base = total / columns;
    let mut widths = vec![base; columns];
    if let Some(last) = widths.last_mut() {
        *last += total - base * columns;
    }
    Ok(widths)
}

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers. Text is encoded in the
/// configured charset as it is appended, and style modifiers are only
/// emitted when they change.
#[derive(Debug, Clone)]
pub struct EscPosBuilder {
    buf: Vec<u8>,
    columns: usize,
    charset: Charset,
    alignment: Alignment,
    emphasis: Emphasis,
    scale: Scale,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in characters.
    /// The hardware reset is written immediately.
    pub fn new(columns: usize, charset: Charset) -> Self {
        let mut b = Self {
            buf: Vec::with_capacity(4096),
            columns,
            charset,
            alignment: Alignment::Left,
            emphasis: Emphasis::NONE,
            scale: Scale::Normal,
        };
        b.initialize();
        b
    }

    pub fn with_config(config: &EncoderConfig) -> Self {
        Self::new(config.columns, config.charset)
    }

    /// Get the configured paper width
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Characters per line at the current scale
    pub fn effective_columns(&self) -> usize {
        (self.columns / self.scale.width_factor()).max(1)
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    // === Initialization ===

    /// Reset printer (ESC @) and select the code page
    pub fn initialize(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, 0x40]);
        self.buf.extend_from_slice(self.charset.select_sequence());
        self.alignment = Alignment::Left;
        self.emphasis = Emphasis::NONE;
        self.scale = Scale::Normal;
        self
    }

    // === Modifiers ===

    pub fn set_alignment(&mut self, alignment: Alignment) -> &mut Self {
        if self.alignment != alignment {
            self.buf.extend_from_slice(&[ESC, 0x61, alignment.code()]);
            self.alignment = alignment;
        }
        self
    }

    pub fn set_emphasis(&mut self, emphasis: Emphasis) -> &mut Self {
        if self.emphasis.bold != emphasis.bold {
            // ESC E n
            self.buf.extend_from_slice(&[ESC, 0x45, emphasis.bold as u8]);
        }
        if self.emphasis.underline != emphasis.underline {
            // ESC - n
            self.buf.extend_from_slice(&[ESC, 0x2D, emphasis.underline as u8]);
        }
        if self.emphasis.inverted != emphasis.inverted {
            // GS B n
            self.buf.extend_from_slice(&[GS, 0x42, emphasis.inverted as u8]);
        }
        self.emphasis = emphasis;
        self
    }

    pub fn set_bold(&mut self, bold: bool) -> &mut Self {
        let emphasis = Emphasis {
            bold,
            ..self.emphasis
        };
        self.set_emphasis(emphasis)
    }

    pub fn set_scale(&mut self, scale: Scale) -> &mut Self {
        if self.scale != scale {
            self.buf.extend_from_slice(&[GS, 0x21, scale.size_byte()]);
            self.scale = scale;
        }
        self
    }

    /// Back to left aligned, normal size, no emphasis
    pub fn reset_style(&mut self) -> &mut Self {
        self.set_alignment(Alignment::Left)
            .set_emphasis(Emphasis::NONE)
            .set_scale(Scale::Normal)
    }

    // === Text Output ===

    /// Write text in the configured charset
    pub fn append_text(&mut self, s: &str) -> &mut Self {
        let bytes = self.charset.encode(s);
        self.buf.extend_from_slice(&bytes);
        self
    }

    /// Write text followed by newline
    pub fn append_line(&mut self, s: &str) -> &mut Self {
        self.append_text(s);
        self.buf.push(b'\n');
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Print and feed n lines (ESC d n)
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, 0x64, lines]);
        self
    }

    // === Layout Helpers ===

    /// Fill exactly one line with `ch`
    pub fn append_separator_line(&mut self, ch: char) -> &mut Self {
        let unit = self.charset.width(ch.encode_utf8(&mut [0u8; 4])).max(1);
        let line = ch.to_string().repeat(self.effective_columns() / unit);
        self.append_line(&line)
    }

    /// Print left and right text on the same line.
    ///
    /// `right` is flush right and never truncated; `left` is truncated so at
    /// least one space separates them. When `right` alone fills the line it
    /// is printed on its own.
    pub fn append_two_column_line(&mut self, left: &str, right: &str) -> &mut Self {
        let line = two_column_line(self.charset, self.effective_columns(), left, right);
        self.append_line(&line)
    }

    /// Print a table. The header row is bold; the first column is left
    /// aligned and the others right aligned.
    pub fn append_table<S: AsRef<str>>(
        &mut self,
        headers: &[S],
        rows: &[Vec<String>],
        widths: Option<&[usize]>,
    ) -> EncodeResult<&mut Self> {
        let widths = column_widths(self.effective_columns(), headers.len(), widths)?;
        for (idx, row) in rows.iter().enumerate() {
            if row.len() > widths.len() {
                return Err(EncodeError::TableShape {
                    row: idx,
                    cells: row.len(),
                    columns: widths.len(),
                });
            }
        }

        let bold_before = self.emphasis.bold;
        self.set_bold(true);
        let header_line = table_row(self.charset, &widths, headers.iter().map(|h| h.as_ref()));
        self.append_line(&header_line);
        self.set_bold(bold_before);

        for row in rows {
            let cells = (0..widths.len()).map(|i| row.get(i).map(String::as_str).unwrap_or(""));
            let line = table_row(self.charset, &widths, cells);
            self.append_line(&line);
        }
        Ok(self)
    }

    // === Barcodes ===

    /// Print a 1D barcode
    pub fn append_barcode(
        &mut self,
        data: &str,
        symbology: Symbology,
        options: BarcodeOptions,
    ) -> EncodeResult<&mut Self> {
        let payload = symbology.payload(data)?;
        if payload.len() > u8::MAX as usize {
            return Err(EncodeError::InvalidBarcode {
                symbology: symbology.name(),
                reason: format!("{} bytes exceeds 255", payload.len()),
            });
        }
        let hri = match options.hri {
            HriPosition::None => 0,
            HriPosition::Above => 1,
            HriPosition::Below => 2,
            HriPosition::Both => 3,
        };
        // GS h n - height
        self.buf.extend_from_slice(&[GS, 0x68, options.height.max(1)]);
        // GS w n - module width
        self.buf
            .extend_from_slice(&[GS, 0x77, options.module_width.clamp(2, 6)]);
        // GS H n - HRI position
        self.buf.extend_from_slice(&[GS, 0x48, hri]);
        // GS k m n d1..dn
        self.buf
            .extend_from_slice(&[GS, 0x6B, symbology.code(), payload.len() as u8]);
        self.buf.extend_from_slice(&payload);
        self.buf.push(b'\n');
        Ok(self)
    }

    /// Print a QR code
    pub fn append_qr_code(&mut self, data: &str, options: QrOptions) -> EncodeResult<&mut Self> {
        let data_bytes = data.as_bytes();
        if data_bytes.len() > QR_MAX_PAYLOAD {
            return Err(EncodeError::QrTooLarge(data_bytes.len()));
        }
        let size = options.size.clamp(1, 16);
        let ec = match options.error_correction {
            QrErrorCorrection::L => 0x30,
            QrErrorCorrection::M => 0x31,
            QrErrorCorrection::Q => 0x32,
            QrErrorCorrection::H => 0x33,
        };

        // Function 165: Select model (Model 2)
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x32, 0x00]);

        // Function 167: Set module size
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, size]);

        // Function 169: Set error correction
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, ec]);

        // Function 180: Store data, pL pH count the 3 function bytes too
        let len = data_bytes.len() + 3;
        let p_l = (len & 0xFF) as u8;
        let p_h = ((len >> 8) & 0xFF) as u8;
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, p_l, p_h, 0x31, 0x50, 0x30]);
        self.buf.extend_from_slice(data_bytes);

        // Function 181: Print
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]);
        self.buf.push(b'\n');

        Ok(self)
    }

    // === Build ===

    /// Append the end-of-document actions and return the buffer.
    ///
    /// Order is feed + cut, drawer pulse, beep.
    pub fn finalize(mut self, finish: Finish) -> Vec<u8> {
        self.reset_style();
        if finish.cut {
            // GS V 66 n - feed n lines then full cut
            self.buf.extend_from_slice(&[GS, 0x56, 0x42, 0x03]);
        } else {
            self.feed(4);
        }
        if finish.open_drawer {
            // ESC p m t1 t2 - pulse on pin 2
            self.buf.extend_from_slice(&[ESC, 0x70, 0x00, 25, 250]);
        }
        if finish.beep {
            // ESC B n t - 3 beeps, 100ms each
            self.buf.extend_from_slice(&[ESC, 0x42, 0x03, 0x02]);
        }
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::with_config(&EncoderConfig::default())
    }
}

/// Lay out a left/right pair on a `columns` wide line
pub fn two_column_line(charset: Charset, columns: usize, left: &str, right: &str) -> String {
    let rw = charset.width(right);
    if rw >= columns {
        return right.to_string();
    }
    let left = truncate_to_width(charset, left, columns - rw - 1);
    let lw = charset.width(&left);
    let spaces = columns - lw - rw;
    format!("{}{}{}", left, " ".repeat(spaces), right)
}

fn table_row<'a>(
    charset: Charset,
    widths: &[usize],
    cells: impl Iterator<Item = &'a str>,
) -> String {
    let mut line = String::new();
    for (idx, (cell, width)) in cells.zip(widths.iter()).enumerate() {
        // keep one separating space when the column is wide enough
        let room = if *width > 1 { width - 1 } else { *width };
        let text = truncate_to_width(charset, cell, room);
        line.push_str(&pad_to_width(charset, &text, *width, idx > 0));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(b: &EscPosBuilder) -> String {
        String::from_utf8_lossy(b.as_bytes()).into_owned()
    }

    #[test]
    fn test_builder_starts_with_initialize() {
        let b = EscPosBuilder::new(32, Charset::Pc858);
        assert_eq!(b.as_bytes(), &[0x1B, 0x40, 0x1B, 0x74, 19]);
    }

    #[test]
    fn test_modifiers_only_emitted_on_change() {
        let mut b = EscPosBuilder::new(32, Charset::Pc437);
        let start = b.as_bytes().len();
        b.set_alignment(Alignment::Left).set_scale(Scale::Normal);
        assert_eq!(b.as_bytes().len(), start);

        b.set_alignment(Alignment::Center).set_alignment(Alignment::Center);
        assert_eq!(&b.as_bytes()[start..], &[0x1B, 0x61, 0x01]);
    }

    #[test]
    fn test_separator_fills_width() {
        let mut b = EscPosBuilder::new(10, Charset::Pc437);
        b.append_separator_line('=');
        assert!(body(&b).ends_with("==========\n"));
    }

    #[test]
    fn test_separator_respects_double_width() {
        let mut b = EscPosBuilder::new(32, Charset::Pc437);
        b.set_scale(Scale::Double).append_separator_line('-');
        assert!(body(&b).ends_with(&format!("{}\n", "-".repeat(16))));
    }

    #[test]
    fn test_two_column_line_exact_width() {
        for (l, r) in [("Total", "12.50"), ("", "x"), ("abc", "")] {
            let line = two_column_line(Charset::Pc437, 32, l, r);
            assert_eq!(line.len(), 32);
            assert!(line.ends_with(r));
            assert!(line.starts_with(l));
        }
    }

    #[test]
    fn test_two_column_line_truncates_left() {
        let line = two_column_line(Charset::Pc437, 10, "abcdefghij", "1234");
        assert_eq!(line, "abcde 1234");
    }

    #[test]
    fn test_two_column_line_long_right_kept_whole() {
        let line = two_column_line(Charset::Pc437, 5, "left", "123456");
        assert_eq!(line, "123456");
    }

    #[test]
    fn test_column_widths_absorb_residue() {
        assert_eq!(column_widths(32, 3, None).unwrap(), vec![10, 10, 12]);
        assert_eq!(column_widths(48, 5, None).unwrap(), vec![9, 9, 9, 9, 12]);
        for n in 1..=12 {
            for w in [32, 48] {
                let widths = column_widths(w, n, None).unwrap();
                assert_eq!(widths.iter().sum::<usize>(), w);
            }
        }
    }

    #[test]
    fn test_column_widths_errors() {
        assert_eq!(column_widths(32, 0, None), Err(EncodeError::EmptyTable));
        assert!(column_widths(32, 2, Some(&[10])).is_err());
        assert!(column_widths(32, 2, Some(&[0, 10])).is_err());
        assert!(column_widths(32, 2, Some(&[20, 20])).is_err());
        assert_eq!(column_widths(32, 2, Some(&[20, 12])).unwrap(), vec![20, 12]);
    }

    #[test]
    fn test_table_header_bold_and_rows_width() {
        let mut b = EscPosBuilder::new(20, Charset::Pc437);
        b.append_table(
            &["Item", "Qty"],
            &[vec!["Coffee".into(), "2".into()], vec!["Tea".into()]],
            None,
        )
        .unwrap();
        let bytes = b.as_bytes();
        let bold_on = bytes.windows(3).position(|w| w == [0x1B, 0x45, 0x01]);
        let bold_off = bytes.windows(3).position(|w| w == [0x1B, 0x45, 0x00]);
        assert!(bold_on.unwrap() < bold_off.unwrap());

        let text = body(&b);
        assert!(text.contains("Coffee             2\n"));
        assert!(text.contains("Tea                 \n"));
    }

    #[test]
    fn test_table_rejects_extra_cells() {
        let mut b = EscPosBuilder::new(20, Charset::Pc437);
        let err = b
            .append_table(&["A"], &[vec!["1".into(), "2".into()]], None)
            .unwrap_err();
        assert!(matches!(err, EncodeError::TableShape { row: 0, .. }));
    }

    #[test]
    fn test_qr_length_prefix() {
        let mut b = EscPosBuilder::new(32, Charset::Pc437);
        let data = "x".repeat(300);
        b.append_qr_code(&data, QrOptions::default()).unwrap();
        let bytes = b.as_bytes();
        let store = bytes
            .windows(3)
            .position(|w| w == [0x31, 0x50, 0x30])
            .unwrap();
        // 300 + 3 = 303 = 0x012F
        assert_eq!(bytes[store - 2], 0x2F);
        assert_eq!(bytes[store - 1], 0x01);
    }

    #[test]
    fn test_qr_too_large() {
        let mut b = EscPosBuilder::new(32, Charset::Pc437);
        let data = "x".repeat(QR_MAX_PAYLOAD + 1);
        assert!(matches!(
            b.append_qr_code(&data, QrOptions::default()),
            Err(EncodeError::QrTooLarge(_))
        ));
    }

    #[test]
    fn test_barcode_sequence() {
        let mut b = EscPosBuilder::new(32, Charset::Pc437);
        let start = b.as_bytes().len();
        b.append_barcode("4006381333931", Symbology::Ean13, BarcodeOptions::default())
            .unwrap();
        let bytes = &b.as_bytes()[start..];
        assert_eq!(&bytes[..3], &[0x1D, 0x68, 80]);
        let k = bytes.windows(2).position(|w| w == [0x1D, 0x6B]).unwrap();
        assert_eq!(bytes[k + 2], 67);
        assert_eq!(bytes[k + 3], 13);
    }

    #[test]
    fn test_barcode_validation() {
        let mut b = EscPosBuilder::new(32, Charset::Pc437);
        assert!(b
            .append_barcode("12AB", Symbology::Ean13, BarcodeOptions::default())
            .is_err());
        assert!(b
            .append_barcode("123", Symbology::Itf, BarcodeOptions::default())
            .is_err());
        assert!(b
            .append_barcode("abc", Symbology::Code39, BarcodeOptions::default())
            .is_err());
    }

    #[test]
    fn test_code128_gets_code_set_prefix() {
        let mut b = EscPosBuilder::new(32, Charset::Pc437);
        b.append_barcode("ORDER-42", Symbology::Code128, BarcodeOptions::default())
            .unwrap();
        assert!(body(&b).contains("{BORDER-42"));
    }

    #[test]
    fn test_unknown_symbology() {
        assert!(matches!(
            "PDF417".parse::<Symbology>(),
            Err(EncodeError::UnknownSymbology(_))
        ));
        assert_eq!("ean-13".parse::<Symbology>().unwrap(), Symbology::Ean13);
    }

    #[test]
    fn test_finalize_order() {
        let b = EscPosBuilder::new(32, Charset::Pc437);
        let bytes = b.finalize(Finish {
            cut: true,
            open_drawer: true,
            beep: true,
        });
        let cut = bytes.windows(3).position(|w| w == [0x1D, 0x56, 0x42]).unwrap();
        let drawer = bytes.windows(2).position(|w| w == [0x1B, 0x70]).unwrap();
        let beep = bytes.windows(2).position(|w| w == [0x1B, 0x42]).unwrap();
        assert!(cut < drawer && drawer < beep);
        assert_eq!(&bytes[bytes.len() - 4..], &[0x1B, 0x42, 0x03, 0x02]);
    }

    #[test]
    fn test_finalize_without_cut_feeds() {
        let bytes = EscPosBuilder::new(32, Charset::Pc437).finalize(Finish::default());
        assert_eq!(&bytes[bytes.len() - 3..], &[0x1B, 0x64, 4]);
        assert!(!bytes.windows(2).any(|w| w == [0x1D, 0x56]));
    }
}
