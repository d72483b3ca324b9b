//! Marker recognition with the `tesseract` CLI.
//!
//! Each frame is PNG-encoded and piped to
//! `tesseract stdin stdout --psm 7 -c tessedit_char_whitelist=<alphabet> tsv`.
//! Word rows of the TSV output become [`TextRegion`]s with confidence
//! scaled from `0..100` to `0..1`.

use std::io::{Cursor, Write};
use std::process::{Command, Stdio};

use image::{ImageFormat, RgbImage};
use vidsync_common::config::ToolPaths;
use vidsync_core::marker::{BoundingBox, RecognitionError, TextRecognizer, TextRegion};

/// TSV row level of a single word.
const WORD_LEVEL: &str = "5";

/// Parse tesseract TSV output into word regions.
///
/// Rows that are not words, have no text, or carry a negative confidence
/// are skipped.
pub fn parse_tsv(tsv: &str) -> Result<Vec<TextRegion>, RecognitionError> {
    let mut lines = tsv.lines();
    let header: Vec<&str> = match lines.next() {
        Some(line) => line.split('\t').collect(),
        None => return Ok(Vec::new()),
    };
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| RecognitionError::Output(format!("missing TSV column {name}")))
    };
    let level = column("level")?;
    let left = column("left")?;
    let top = column("top")?;
    let width = column("width")?;
    let height = column("height")?;
    let conf = column("conf")?;
    let text = column("text")?;

    let mut regions = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.get(level).map(|l| l.trim()) != Some(WORD_LEVEL) {
            continue;
        }
        let word = fields.get(text).map(|t| t.trim()).unwrap_or("");
        if word.is_empty() {
            continue;
        }
        let confidence: f64 = fields
            .get(conf)
            .and_then(|c| c.trim().parse().ok())
            .unwrap_or(-1.0);
        if confidence < 0.0 {
            continue;
        }
        let number = |idx: usize| -> u32 {
            fields
                .get(idx)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0)
        };
        regions.push(TextRegion {
            bbox: BoundingBox {
                x: number(left),
                y: number(top),
                width: number(width),
                height: number(height),
            },
            text: word.to_string(),
            confidence: (confidence / 100.0).clamp(0.0, 1.0),
        });
    }
    Ok(regions)
}

/// [`TextRecognizer`] backed by the tesseract CLI.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: String,

    /// Page segmentation mode; 7 treats the image as one text line.
    psm: u8,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            psm: 7,
        }
    }

    pub fn from_tools(tools: &ToolPaths) -> Self {
        Self::new(tools.tesseract.clone())
    }

    pub fn args(&self, allowlist: &str) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "--psm".to_string(),
            self.psm.to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={allowlist}"),
            "tsv".to_string(),
        ]
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn read(
        &mut self,
        image: &RgbImage,
        allowlist: &str,
    ) -> Result<Vec<TextRegion>, RecognitionError> {
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| RecognitionError::Failed(format!("PNG encode failed: {e}")))?;

        let mut child = Command::new(&self.binary)
            .args(self.args(allowlist))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecognitionError::Unavailable(format!("{}: {e}", self.binary)))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| RecognitionError::Failed("failed to open tesseract stdin".into()))?;
            stdin
                .write_all(png.get_ref())
                .map_err(|e| RecognitionError::Failed(format!("failed to send frame: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| RecognitionError::Failed(format!("failed to wait on tesseract: {e}")))?;
        if !output.status.success() {
            return Err(RecognitionError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_tsv(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_word_rows() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t640\t80\t-1\t\n\
             4\t1\t1\t1\t1\t0\t10\t12\t120\t40\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t12\t60\t40\t91.5\t271\n\
             5\t1\t1\t1\t1\t2\t80\t12\t50\t40\t43\t7\n"
        );
        let regions = parse_tsv(&tsv).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].text, "271");
        assert!((regions[0].confidence - 0.915).abs() < 1e-9);
        assert_eq!(regions[0].bbox.x, 10);
        assert_eq!(regions[0].bbox.width, 60);
        assert!((regions[1].confidence - 0.43).abs() < 1e-9);
    }

    #[test]
    fn test_empty_words_are_skipped() {
        let tsv = format!("{HEADER}\n5\t1\t1\t1\t1\t1\t0\t0\t5\t5\t95\t \n");
        assert!(parse_tsv(&tsv).unwrap().is_empty());
    }

    #[test]
    fn test_empty_output() {
        assert!(parse_tsv("").unwrap().is_empty());
    }

    #[test]
    fn test_missing_column_is_output_error() {
        let err = parse_tsv("level\ttext\n5\t12\n").unwrap_err();
        assert!(matches!(err, RecognitionError::Output(_)));
    }

    #[test]
    fn test_args_restrict_alphabet() {
        let args = TesseractRecognizer::new("tesseract").args("0123456789");
        assert_eq!(
            args,
            vec![
                "stdin",
                "stdout",
                "--psm",
                "7",
                "-c",
                "tessedit_char_whitelist=0123456789",
                "tsv"
            ]
        );
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let mut recognizer = TesseractRecognizer::new("vidsync-definitely-not-tesseract");
        let err = recognizer
            .read(&RgbImage::new(4, 4), "0123456789")
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Unavailable(_)));
    }
}
