//! Extraction of device-tree `compatible` strings from blob contents.
//!
//! Three shapes are recognized, depending on the family of the blob:
//! `.compatible = "vendor,device"` member initializers in C sources,
//! `compatible = "a", "b";` properties in device-tree sources, and bare
//! `vendor,device` tokens in binding documents (which are free-form text or
//! YAML, so quoting cannot be relied upon).

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::family::Family;
use crate::LineNumber;

// Explicit ASCII classes: these run over raw blob bytes that are not
// guaranteed to be valid UTF-8.
static COMPATIBLE_C: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\.compatible\s*=\s*"([0-9A-Za-z_,.+-]+)""#).unwrap());

static COMPATIBLE_DTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"compatible\s*=\s*((?:"[0-9A-Za-z_,.+-]+"[,\s]*)+);"#).unwrap());

static COMPATIBLE_DTS_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([0-9A-Za-z_,.+-]+)""#).unwrap());

static COMPATIBLE_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9A-Za-z_.+-]+,[0-9A-Za-z_.+-]+").unwrap());

/// Scans a blob for compatible strings, yielding each occurrence with its
/// 1-based line number. Occurrences are not deduplicated.
pub fn scan_compatibles(content: &[u8], family: Family) -> Vec<(Vec<u8>, LineNumber)> {
    let mut found = Vec::new();

    match family {
        Family::D => {
            for property in COMPATIBLE_DTS.captures_iter(content) {
                let Some(strings) = property.get(1) else { continue };
                for string in COMPATIBLE_DTS_STRING.captures_iter(strings.as_bytes()) {
                    let Some(value) = string.get(1) else { continue };
                    let at = strings.start() + value.start();
                    found.push((value.as_bytes().to_vec(), line_of(content, at)));
                }
            }
        }
        Family::B => {
            for token in COMPATIBLE_BARE.find_iter(content) {
                found.push((token.as_bytes().to_vec(), line_of(content, token.start())));
            }
        }
        _ => {
            for capture in COMPATIBLE_C.captures_iter(content) {
                let Some(value) = capture.get(1) else { continue };
                found.push((value.as_bytes().to_vec(), line_of(content, value.start())));
            }
        }
    }

    found
}

fn line_of(content: &[u8], at: usize) -> LineNumber {
    content[..at].iter().filter(|&&b| b == b'\n').count() as LineNumber + 1
}
