use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Primary-header keywords of a FITS file.
///
/// The header is parsed with a minimal card reader rather than a full FITS
/// stack: the pipelines here only ever need keyword/value pairs from the
/// primary HDU, and astrometry.net writes plain ASCII cards.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FitsHeader {
    pub filename: String,
    keywords: HashMap<String, String>,
}

impl FitsHeader {
    /// Read the primary header of a FITS file.
    pub fn read(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .with_context(|| format!("Failed to open FITS file: {}", path.display()))?;

        // Read 2880-byte header blocks until the END card shows up
        let mut header_data = Vec::new();
        loop {
            let mut block = vec![0u8; 2880];
            match file.read_exact(&mut block) {
                Ok(_) => {
                    let block_str = String::from_utf8_lossy(&block);
                    header_data.extend_from_slice(&block);
                    if block_str.contains("END ") {
                        break;
                    }
                }
                Err(_) => break, // End of file
            }

            // Safety limit - don't read more than 10 blocks (28.8 KB)
            if header_data.len() > 28800 {
                break;
            }
        }

        if header_data.is_empty() {
            return Err(anyhow!("Empty or truncated FITS file: {}", path.display()));
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(FitsHeader {
            filename,
            keywords: parse_header_cards(&header_data),
        })
    }

    pub fn from_keywords(filename: &str, keywords: HashMap<String, String>) -> Self {
        FitsHeader {
            filename: filename.to_string(),
            keywords,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keywords.get(key).map(|s| s.as_str())
    }

    pub fn opt_f64(&self, key: &str) -> Option<f64> {
        self.keywords.get(key).and_then(|s| s.parse::<f64>().ok())
    }

    /// Numeric value for a required keyword.
    pub fn require_f64(&self, key: &str) -> Result<f64> {
        let raw = self
            .keywords
            .get(key)
            .ok_or_else(|| anyhow!("Missing {} header in {}", key, self.filename))?;
        raw.parse::<f64>()
            .map_err(|_| anyhow!("{} header is not numeric in {}: '{}'", key, self.filename, raw))
    }

    pub fn opt_i64(&self, key: &str) -> Option<i64> {
        self.keywords.get(key).and_then(|s| s.parse::<i64>().ok())
    }

    /// Observation timestamp from DATE-OBS, taken as UTC.
    pub fn date_obs(&self) -> Result<DateTime<Utc>> {
        let raw = self
            .keywords
            .get("DATE-OBS")
            .ok_or_else(|| anyhow!("Missing DATE-OBS header in {}", self.filename))?;
        parse_date_obs(raw)
            .ok_or_else(|| anyhow!("Unparseable DATE-OBS in {}: '{}'", self.filename, raw))
    }

    /// Whether the header carries a plate solution.
    pub fn is_solved(&self) -> bool {
        self.keywords.contains_key("CRVAL1")
            && (self.keywords.contains_key("CD1_1") || self.keywords.contains_key("CDELT1"))
    }

    pub fn keywords(&self) -> &HashMap<String, String> {
        &self.keywords
    }
}

/// Parse FITS header blocks into a keyword map.
///
/// FITS headers are organized in 80-character cards. COMMENT and HISTORY
/// cards carry no keyword value and are skipped.
pub fn parse_header_cards(data: &[u8]) -> HashMap<String, String> {
    let mut keywords = HashMap::new();

    for chunk in data.chunks(80) {
        if let Ok(card) = std::str::from_utf8(chunk) {
            let card = card.trim();

            if card.starts_with("END") {
                break;
            }

            if card.is_empty() || card.starts_with("COMMENT") || card.starts_with("HISTORY") {
                continue;
            }

            // KEYWORD = VALUE / COMMENT
            if let Some(eq_pos) = card.find('=') {
                let keyword = card[..eq_pos].trim();
                let value_part = &card[eq_pos + 1..];

                // Quoted string values may themselves contain '/'
                let value = if value_part.trim_start().starts_with('\'') {
                    let trimmed = value_part.trim_start();
                    match trimmed[1..].find('\'') {
                        Some(close) => &trimmed[1..close + 1],
                        None => trimmed.trim_matches('\''),
                    }
                } else if let Some(comment_pos) = value_part.find('/') {
                    value_part[..comment_pos].trim()
                } else {
                    value_part.trim()
                };

                let cleaned_value = value.trim_matches('\'').trim_matches('"').trim().to_string();

                if !keyword.is_empty() {
                    keywords.insert(keyword.to_string(), cleaned_value);
                }
            }
        }
    }

    keywords
}

fn parse_date_obs(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim().trim_matches('\'');
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    // Date-only headers from very old acquisition runs
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Modified Julian Date of a UTC timestamp.
pub fn mjd(time: DateTime<Utc>) -> f64 {
    // MJD epoch 1858-11-17T00:00 is 40587 days before the Unix epoch
    time.timestamp_millis() as f64 / 1000.0 / 86400.0 + 40587.0
}
