//! Character set handling for thermal printers
//!
//! Printers only understand single-byte code pages (or GBK on Chinese
//! models). This module provides utilities for:
//! - Transliterating text for restricted 8-bit code pages
//! - Encoding text into the printer's code page
//! - Calculating, truncating and padding by printed column width

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::{Encoding, GBK, WINDOWS_1252};
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;

/// Printer character set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Charset {
    /// PC437 (USA, standard Europe). Restricted: non-ASCII is transliterated.
    #[default]
    Pc437,
    /// PC858 (multilingual + euro). Restricted: non-ASCII is transliterated.
    Pc858,
    /// WPC1252, encoded natively.
    Windows1252,
    /// GBK for Chinese printers.
    Gbk,
}

impl Charset {
    /// Restricted charsets cannot carry accented letters reliably
    pub fn is_restricted(self) -> bool {
        matches!(self, Charset::Pc437 | Charset::Pc858)
    }

    /// Code page selection sequence, sent right after `ESC @`
    pub fn select_sequence(self) -> &'static [u8] {
        match self {
            // ESC t n
            Charset::Pc437 => &[0x1B, 0x74, 0x00],
            Charset::Pc858 => &[0x1B, 0x74, 19],
            Charset::Windows1252 => &[0x1B, 0x74, 16],
            // FS & (Chinese mode) + FS C 1 (GBK)
            Charset::Gbk => &[0x1C, 0x26, 0x1C, 0x43, 0x01],
        }
    }

    /// Encode text for this charset.
    ///
    /// ASCII control characters other than `\n` and `\t` are dropped so text
    /// can never smuggle printer commands.
    pub fn encode(self, s: &str) -> Vec<u8> {
        let clean = sanitize(s);
        let mut out = Vec::with_capacity(clean.len());
        match self {
            Charset::Pc437 | Charset::Pc858 => {
                out.extend(transliterate(&clean).bytes());
            }
            Charset::Windows1252 => encode_with(WINDOWS_1252, &clean, &mut out),
            Charset::Gbk => {
                let parts: Vec<&str> = clean.split('€').collect();
                for (idx, part) in parts.iter().enumerate() {
                    if !part.is_empty() {
                        encode_with(GBK, part, &mut out);
                    }
                    if idx < parts.len() - 1 {
                        // Exit Chinese -> PC858 -> Euro -> Enter Chinese
                        out.extend_from_slice(&[0x1C, 0x2E, 0x1B, 0x74, 19, 0xD5, 0x1C, 0x26]);
                    }
                }
            }
        }
        out
    }

    /// Printed width of a string in columns.
    ///
    /// Single-byte code pages print one column per byte; GBK wide characters
    /// take two.
    pub fn width(self, s: &str) -> usize {
        match self {
            Charset::Gbk => {
                let clean = sanitize(s).replace('€', "E");
                let mut out = Vec::with_capacity(clean.len());
                encode_with(GBK, &clean, &mut out);
                out.len()
            }
            _ => self.encode(s).len(),
        }
    }

    /// Stable name used in configuration
    pub fn as_str(self) -> &'static str {
        match self {
            Charset::Pc437 => "pc437",
            Charset::Pc858 => "pc858",
            Charset::Windows1252 => "windows1252",
            Charset::Gbk => "gbk",
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Charset {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "pc437" | "cp437" | "ascii" => Ok(Charset::Pc437),
            "pc858" | "cp858" => Ok(Charset::Pc858),
            "windows1252" | "wpc1252" | "cp1252" | "latin1" => Ok(Charset::Windows1252),
            "gbk" | "gb2312" => Ok(Charset::Gbk),
            _ => Err(EncodeError::UnknownCharset(s.to_string())),
        }
    }
}

/// Truncate a string to fit within a column width
pub fn truncate_to_width(charset: Charset, s: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut result = String::new();
    for c in s.chars() {
        let mut buf = [0u8; 4];
        let char_len = charset.width(c.encode_utf8(&mut buf));

        if width + char_len > max_width {
            break;
        }
        result.push(c);
        width += char_len;
    }
    result
}

/// Pad a string to a specific column width
///
/// If the string is longer than the width, it will be truncated.
pub fn pad_to_width(charset: Charset, s: &str, width: usize, align_right: bool) -> String {
    let current_width = charset.width(s);
    if current_width >= width {
        return truncate_to_width(charset, s, width);
    }
    let spaces = width - current_width;
    if align_right {
        format!("{}{}", " ".repeat(spaces), s)
    } else {
        format!("{}{}", s, " ".repeat(spaces))
    }
}

/// Replace non-ASCII characters by their closest ASCII spelling.
///
/// Characters without a known spelling become `?`.
pub fn transliterate(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            out.push_str(fold_char(c).unwrap_or("?"));
        }
    }
    Cow::Owned(out)
}

fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ą' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ą' => "A",
        'æ' => "ae",
        'Æ' => "AE",
        'ç' | 'ć' | 'č' => "c",
        'Ç' | 'Ć' | 'Č' => "C",
        'ď' | 'đ' => "d",
        'Ď' | 'Đ' => "D",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ę' | 'Ě' => "E",
        'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' => "I",
        'ł' => "l",
        'Ł' => "L",
        'ñ' | 'ń' | 'ň' => "n",
        'Ñ' | 'Ń' | 'Ň' => "N",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' => "O",
        'œ' => "oe",
        'Œ' => "OE",
        'ř' => "r",
        'Ř' => "R",
        'ś' | 'š' => "s",
        'Ś' | 'Š' => "S",
        'ß' => "ss",
        'ť' => "t",
        'Ť' => "T",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' | 'Ÿ' => "Y",
        'ź' | 'ż' | 'ž' => "z",
        'Ź' | 'Ż' | 'Ž' => "Z",
        '€' => "EUR",
        '£' => "GBP",
        '¥' => "JPY",
        '¢' => "c",
        '°' | 'º' => "o",
        'ª' => "a",
        '«' | '»' | '“' | '”' | '„' => "\"",
        '‘' | '’' | '‚' | '′' => "'",
        '–' | '—' | '‑' => "-",
        '…' => "...",
        '\u{a0}' | '\u{202f}' => " ",
        '×' => "x",
        '÷' => "/",
        '·' | '•' => "*",
        '½' => "1/2",
        '¼' => "1/4",
        '¾' => "3/4",
        '©' => "(c)",
        '®' => "(R)",
        '™' => "TM",
        '¡' => "!",
        '¿' => "?",
        _ => return None,
    };
    Some(folded)
}

fn sanitize(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !is_stripped_control(*c)).collect())
}

fn is_stripped_control(c: char) -> bool {
    c.is_ascii_control() && c != '\n' && c != '\t'
}

/// Encode with an `encoding_rs` encoding, falling back to transliteration and
/// then `?` for unmappable characters (instead of HTML numeric references).
fn encode_with(encoding: &'static Encoding, s: &str, out: &mut Vec<u8>) {
    let (bytes, _, had_errors) = encoding.encode(s);
    if !had_errors {
        out.extend_from_slice(&bytes);
        return;
    }
    let mut buf = [0u8; 4];
    for c in s.chars() {
        let (bytes, _, unmappable) = encoding.encode(c.encode_utf8(&mut buf));
        if !unmappable {
            out.extend_from_slice(&bytes);
        } else if let Some(folded) = fold_char(c) {
            out.extend_from_slice(folded.as_bytes());
        } else {
            out.push(b'?');
        }
    }
}
