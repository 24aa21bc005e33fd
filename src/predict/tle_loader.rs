use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use sgp4::{Elements, TleError};

use crate::predict::error::{ElementError, PredictError};
use crate::predict::types::{OrbitalElements, SatelliteId};

/// A record that could not be turned into elements.
#[derive(Debug, Clone)]
pub struct RejectedRecord {
    pub name: Option<String>,
    /// 1-based index of the record's first line among the non-empty lines.
    pub position: usize,
    pub error: ElementError,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub elements: Vec<OrbitalElements>,
    pub rejected: Vec<RejectedRecord>,
}

impl LoadReport {
    pub fn merge(&mut self, other: LoadReport) {
        self.elements.extend(other.elements);
        self.rejected.extend(other.rejected);
    }

    fn record(
        &mut self,
        position: usize,
        name: Option<String>,
        result: Result<OrbitalElements, ElementError>,
    ) {
        match result {
            Ok(elements) => self.elements.push(elements),
            Err(error) => self.rejected.push(RejectedRecord {
                name,
                position,
                error,
            }),
        }
    }

    /// One element set per satellite, the newest epoch winning.
    pub fn latest_by_id(&self) -> HashMap<SatelliteId, OrbitalElements> {
        let mut latest: HashMap<SatelliteId, OrbitalElements> = HashMap::new();
        for elements in &self.elements {
            match latest.get(&elements.norad_id) {
                Some(existing) if existing.epoch >= elements.epoch => {}
                _ => {
                    latest.insert(elements.norad_id, elements.clone());
                }
            }
        }
        latest
    }
}

/// Reads element sets from a single file or every `.tle`/`.txt` file in a
/// directory.
pub struct TleLoader {
    path: PathBuf,
}

impl TleLoader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<LoadReport, PredictError> {
        if !self.path.exists() {
            return Err(PredictError::PathNotFound(self.path.display().to_string()));
        }

        if self.path.is_file() {
            return Ok(parse_tle_text(&fs::read_to_string(&self.path)?));
        }

        let mut report = LoadReport::default();
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "tle" || ext == "txt")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        for path in paths {
            match fs::read_to_string(&path) {
                Ok(content) => {
                    let file_report = parse_tle_text(&content);
                    for rejected in &file_report.rejected {
                        log::warn!(
                            "Rejected TLE record {} in {}: {}",
                            rejected.position,
                            path.display(),
                            rejected.error
                        );
                    }
                    report.merge(file_report);
                }
                Err(e) => {
                    log::warn!("Failed to read TLE file {}: {}", path.display(), e);
                }
            }
        }

        Ok(report)
    }
}

/// Parses 2-line and 3-line (named) records. A bad record is reported and
/// skipped; the rest of the text is still loaded.
pub fn parse_tle_text(content: &str) -> LoadReport {
    let lines: Vec<&str> = content
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .collect();

    let mut report = LoadReport::default();
    let mut i = 0;

    while i < lines.len() {
        let is_line = |idx: usize, n: char| {
            lines
                .get(idx)
                .map(|l| l.starts_with(n) && l[1..].starts_with(' '))
                .unwrap_or(false)
        };

        if is_line(i, '1') {
            if is_line(i + 1, '2') {
                report.record(i + 1, None, parse_tle(None, lines[i], lines[i + 1]));
                i += 2;
            } else {
                report.record(i + 1, None, Err(malformed(2, "missing line 2")));
                i += 1;
            }
        } else if is_line(i + 1, '1') && is_line(i + 2, '2') {
            let name = clean_name(lines[i]);
            report.record(
                i + 1,
                Some(name.clone()),
                parse_tle(Some(name), lines[i + 1], lines[i + 2]),
            );
            i += 3;
        } else if is_line(i, '2') {
            report.record(i + 1, None, Err(malformed(1, "line 2 without line 1")));
            i += 1;
        } else {
            log::debug!("Skipping unrecognised TLE line: {}", lines[i]);
            i += 1;
        }
    }

    report
}

/// Decodes one element set from its two fixed-width lines.
fn parse_tle(
    name: Option<String>,
    line1: &str,
    line2: &str,
) -> Result<OrbitalElements, ElementError> {
    let elements = Elements::from_tle(
        name,
        line1.trim_end().as_bytes(),
        line2.trim_end().as_bytes(),
    )
    .map_err(|e| tle_error(&e))?;
    OrbitalElements::try_from(elements)
}

/// sgp4 keeps the error kind and line private; both are named in its
/// `Debug` output.
fn tle_error(error: &TleError) -> ElementError {
    let debug = format!("{:?}", error);
    // A catalog number mismatch is blamed on line 2.
    let line = if debug.contains("Line1") { 1 } else { 2 };
    if debug.contains("BadChecksum") {
        ElementError::Checksum { line }
    } else {
        ElementError::Malformed {
            line,
            message: error.to_string(),
        }
    }
}

fn clean_name(line: &str) -> String {
    let name = line.trim();
    name.strip_prefix("0 ").unwrap_or(name).trim().to_string()
}

fn malformed(line: u8, message: &str) -> ElementError {
    ElementError::Malformed {
        line,
        message: message.to_string(),
    }
}
