//! Text parsing for disk-tool, boot-store and copy-tool output.
//!
//! These tools print localized, column-aligned text and nothing else, so every
//! locale-sensitive word list used to read them lives in this module.
//!
//! Output is decoded lossily from the console code page, so an accented letter
//! may arrive as U+FFFD. Phrase matching strips accents on both sides and lets
//! a replacement character stand in for any accented letter.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

/// Diskpart rounds sizes and offsets to the display unit, so geometry checks
/// allow this much slack before calling two records inconsistent.
pub const ROUNDING_TOLERANCE_MB: f64 = 1024.0;

static PARTITION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bparti(?:tion|ci\S{0,2}n)\s+(\d+)\b\s*(\S+)?")
        .expect("partition marker pattern is valid")
});

static SIZE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:[.,]\d+)?)\s*([GMK])(?:[bo]|ib)?\b").expect("size pattern is valid")
});

static GB_WITH_MB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d+(?:[.,]\d+)?\s*(?:GB|Go|G)\b[^\d\n]*\(\s*(\d+(?:[.,]\d+)?)\s*(?:MB|Mo|M)\b",
    )
    .expect("querymax pattern is valid")
});

static MB_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:[.,]\d+)?)\s*(?:MB|Mo|M)\b").expect("MB pattern is valid")
});

static GB_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:[.,]\d+)?)\s*(?:GB|Go|G)\b").expect("GB pattern is valid")
});

static COPIED_FILES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+(?:file|fichier|archivo|datei)").expect("copy summary pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    System,
    Data,
    Recovery,
    Unknown,
}

impl PartitionKind {
    /// Classify the type column of a `list partition` row.
    pub fn classify(word: &str) -> Self {
        let word = fold(word);
        let starts = |prefixes: &[&str]| prefixes.iter().any(|p| word.starts_with(p));
        if starts(&["syst", "sistema"]) {
            PartitionKind::System
        } else if starts(&["primar", "principal", "basic", "donn", "datos", "data"]) {
            PartitionKind::Data
        } else if starts(&["recover", "recuper", "r\u{fffd}cup"]) {
            PartitionKind::Recovery
        } else {
            PartitionKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionKind::System => "system",
            PartitionKind::Data => "data",
            PartitionKind::Recovery => "recovery",
            PartitionKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRecord {
    pub index: u32,
    pub kind: PartitionKind,
    pub offset_mb: f64,
    pub size_mb: f64,
}

impl PartitionRecord {
    pub fn end_mb(&self) -> f64 {
        self.offset_mb + self.size_mb
    }
}

fn to_number(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok()
}

fn unit_to_mb(value: f64, unit: &str) -> f64 {
    match unit.to_ascii_uppercase().as_str() {
        "G" => value * 1024.0,
        "K" => value / 1024.0,
        _ => value,
    }
}

/// Extract partition rows from `list partition` output, sorted by offset.
///
/// Rows need a `Partition <n>` marker and two size tokens (size, then offset);
/// anything else is ignored.
pub fn parse_partitions(raw: &str) -> Vec<PartitionRecord> {
    let mut records: Vec<PartitionRecord> = raw
        .lines()
        .filter_map(|line| {
            let caps = PARTITION_MARKER.captures(line)?;
            let number = caps.get(1)?;
            let index = number.as_str().parse::<u32>().ok()?;
            let kind = caps
                .get(2)
                .map(|m| PartitionKind::classify(m.as_str()))
                .unwrap_or(PartitionKind::Unknown);

            let sizes: Vec<f64> = SIZE_TOKEN
                .captures_iter(&line[number.end()..])
                .filter_map(|c| Some(unit_to_mb(to_number(c.get(1)?.as_str())?, c.get(2)?.as_str())))
                .collect();
            if sizes.len() < 2 {
                log::debug!("partition row without size and offset: {}", line.trim());
                return None;
            }
            Some(PartitionRecord {
                index,
                kind,
                size_mb: sizes[0],
                offset_mb: sizes[1],
            })
        })
        .collect();
    records.sort_by(|a, b| {
        a.offset_mb
            .partial_cmp(&b.offset_mb)
            .unwrap_or(Ordering::Equal)
    });
    records
}

/// Sanity-check a sorted snapshot: overlaps and records running past the disk end.
pub fn check_geometry(records: &[PartitionRecord], disk_size_mb: Option<f64>) -> Vec<String> {
    let mut warnings = Vec::new();
    for pair in records.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.offset_mb + ROUNDING_TOLERANCE_MB < prev.end_mb() {
            warnings.push(format!(
                "partition {} (offset {:.0} MB) overlaps partition {} (ends at {:.0} MB)",
                next.index,
                next.offset_mb,
                prev.index,
                prev.end_mb()
            ));
        }
    }
    if let Some(disk) = disk_size_mb {
        for record in records {
            if record.end_mb() > disk + ROUNDING_TOLERANCE_MB {
                warnings.push(format!(
                    "partition {} ends at {:.0} MB, past the disk end at {:.0} MB",
                    record.index,
                    record.end_mb(),
                    disk
                ));
            }
        }
    }
    warnings
}

fn mentions_reclaimable(line: &str) -> bool {
    let folded = fold(line);
    ["reclaim", "recup", "r\u{fffd}cup", "maxim", "m\u{fffd}xim"]
        .iter()
        .any(|k| folded.contains(k))
}

/// Read the answer of `shrink querymax` in MB. Returns 0 when no number is found.
pub fn parse_reclaimable_mb(raw: &str) -> f64 {
    let focused: Vec<&str> = raw.lines().filter(|l| mentions_reclaimable(l)).collect();
    let text = if focused.is_empty() {
        raw.to_string()
    } else {
        focused.join("\n")
    };

    let first = |re: &Regex| {
        re.captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| to_number(m.as_str()))
    };
    let value = first(&*GB_WITH_MB)
        .or_else(|| first(&*MB_TOKEN))
        .or_else(|| first(&*GB_TOKEN).map(|gb| gb * 1024.0))
        .unwrap_or(0.0);
    value.max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Neither list matched; callers fall back to the exit status.
    Unknown,
}

/// Localized success and failure phrases for one kind of tool operation.
///
/// Success phrases must name the operation itself. Banners that every run
/// prints (the `rescan` summary for instance) never count as success.
#[derive(Debug, Clone, Copy)]
pub struct PhraseSet {
    pub version: u32,
    pub success: &'static [&'static str],
    pub failure: &'static [&'static str],
}

const FAILURE_V1: &[&str] = &[
    "not enough",
    "error",
    "failed",
    "cannot",
    "could not",
    "not valid",
    "insufficient",
    "no volume selected",
    "no disk selected",
    "insuffisant",
    "pas assez",
    "erreur",
    "impossible",
    "introuvable",
    "échec",
    "non valide",
    "aucun volume",
    "no hay suficiente",
    "no se puede",
    "no se pudo",
];

impl PhraseSet {
    /// `shrink desired=<MB>`.
    pub const SHRINK: PhraseSet = PhraseSet {
        version: 1,
        success: &["shrunk", "reduced", "réduit", "reducido"],
        failure: FAILURE_V1,
    };

    /// `create partition` followed by `format` and `assign`.
    pub const CREATE: PhraseSet = PhraseSet {
        version: 1,
        success: &[
            "succeeded in creating",
            "created",
            "formatted",
            "percent completed",
            "réussi à créer",
            "créé",
            "formaté",
            "pour cent",
            "creado",
            "formateado",
        ],
        failure: FAILURE_V1,
    };

    /// Read-only queries such as `list partition`; only failures are recognised.
    pub const QUERY: PhraseSet = PhraseSet {
        version: 1,
        success: &[],
        failure: FAILURE_V1,
    };

    /// `bcdedit` calls.
    pub const BOOT_STORE: PhraseSet = PhraseSet {
        version: 1,
        success: &[
            "completed successfully",
            "was successfully created",
            "a réussi",
            "correctamente",
        ],
        failure: FAILURE_V1,
    };
}

/// Scan tool output for the operation's success and failure phrases; failure wins.
pub fn detect_outcome(raw: &str, phrases: &PhraseSet) -> Outcome {
    let text = fold_chars(raw);
    let contains = |list: &[&str]| list.iter().any(|p| contains_phrase(&text, p));
    if contains(phrases.failure) {
        Outcome::Failure
    } else if contains(phrases.success) {
        Outcome::Success
    } else {
        Outcome::Unknown
    }
}

/// Number of files reported by a copy-tool summary such as `42 File(s) copied`.
pub fn extract_copied_file_count(raw: &str) -> Option<u64> {
    COPIED_FILES
        .captures_iter(raw)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn strip_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ä' | 'ã' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'ö' | 'õ' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        other => other,
    }
}

fn fold_chars(text: &str) -> Vec<char> {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(strip_accent)
        .collect()
}

fn fold(text: &str) -> String {
    fold_chars(text).into_iter().collect()
}

fn contains_phrase(haystack: &[char], phrase: &str) -> bool {
    let needle: Vec<(char, bool)> = phrase
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| (strip_accent(c), !c.is_ascii()))
        .collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| {
        window
            .iter()
            .zip(&needle)
            .all(|(&h, &(p, accented))| h == p || (accented && h == '\u{fffd}'))
    })
}
