use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Character encodings the download body can be produced in.
///
/// The formatted text is always built as UTF-8 internally and converted to
/// the target encoding before each write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "UTF-16LE")]
    Utf16Le,
    #[serde(rename = "UTF-16BE")]
    Utf16Be,
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self::Utf16Le
    }
}

impl TextEncoding {
    /// Byte-order marker written once, before any content.
    pub fn bom(&self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8 => b"\xEF\xBB\xBF",
            TextEncoding::Utf16Le => b"\xFF\xFE",
            TextEncoding::Utf16Be => b"\xFE\xFF",
        }
    }

    /// Charset label for the content-type header.
    pub fn charset(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16Le => "UTF-16LE",
            TextEncoding::Utf16Be => "UTF-16BE",
        }
    }

    /// Convert formatted text to this encoding's byte representation.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16Le => text
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect(),
            TextEncoding::Utf16Be => text
                .encode_utf16()
                .flat_map(|unit| unit.to_be_bytes())
                .collect(),
        }
    }
}

/// Counters accumulated over one export run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportStats {
    pub pages_fetched: u32,
    pub pages_rendered: u32,
    pub rows_written: u64,
    pub bytes_written: u64,
    pub duration_ms: u64,
}

/// Terminal state of a finished run.
///
/// Once this value exists, headers and body bytes have been committed to the
/// sink; nothing downstream may write to it. The calling layer is
/// responsible for ending the request/response cycle.
#[must_use = "the export has streamed its output; the caller must end the response cycle"]
#[derive(Debug, Clone, Serialize)]
pub struct ExportComplete {
    pub run_id: Uuid,
    pub stats: ExportStats,
}
