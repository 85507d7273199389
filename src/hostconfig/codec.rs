//! Line and document codec for HOST_CONFIG.

use std::collections::BTreeMap;

use tracing::warn;

use super::fields::{
    Schema, SchemaEntry, ALIAS, SWITCH_AUTO, SWITCH_CHAR1, SWITCH_CHAR2, SWITCH_ENABLE,
};
use super::{FieldValue, HostConfig, HostRecord};

/// Column separator.
pub const DELIMITER: char = ':';

/// Parsed host-switch cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToggleGroup {
    /// Switching enabled at all.
    pub enable: bool,
    /// `{}` (automatic) rather than `[]` (manual).
    pub auto: bool,
    /// First host character.
    pub char1: String,
    /// Second host character.
    pub char2: String,
}

impl ToggleGroup {
    /// Parse a cell. An empty cell means switching is disabled.
    #[must_use]
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            return Self::default();
        }
        let mut inner = cell.chars().skip(1).filter(|c| !matches!(c, '}' | ']'));
        Self {
            enable: true,
            auto: cell.starts_with('{'),
            char1: inner.next().map(String::from).unwrap_or_default(),
            char2: inner.next().map(String::from).unwrap_or_default(),
        }
    }

    /// Read the four switch fields of a record.
    #[must_use]
    pub fn from_record(record: &HostRecord) -> Self {
        let yes = |name: &str| record.get(name).is_some_and(|v| v.is("yes"));
        let text = |name: &str| {
            record
                .text(name)
                .map(|v| v.into_owned())
                .unwrap_or_default()
        };
        Self {
            enable: yes(SWITCH_ENABLE),
            auto: yes(SWITCH_AUTO),
            char1: text(SWITCH_CHAR1),
            char2: text(SWITCH_CHAR2),
        }
    }

    /// Store the four switch fields into a record.
    pub fn apply_to(&self, record: &mut HostRecord) {
        record.set(SWITCH_ENABLE, yes_no(self.enable));
        record.set(SWITCH_AUTO, yes_no(self.auto));
        record.set(SWITCH_CHAR1, self.char1.as_str());
        record.set(SWITCH_CHAR2, self.char2.as_str());
    }

    /// Cell text: `{c1c2}`, `[c1c2]` or empty.
    #[must_use]
    pub fn emit(&self) -> String {
        if !self.enable {
            return String::new();
        }
        let (open, close) = if self.auto { ('{', '}') } else { ('[', ']') };
        format!("{open}{}{}{close}", self.char1, self.char2)
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Permissive unsigned parse; anything unparseable is zero and wider
/// values are masked to 32 bits.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_u32(raw: &str) -> u32 {
    raw.trim().parse::<i64>().map_or(0, |value| value as u32)
}

fn bit_is_set(word: u32, bit: u8) -> bool {
    word.checked_shr(u32::from(bit)).is_some_and(|w| w & 1 == 1)
}

fn bit_mask(bit: u8) -> u32 {
    1u32.checked_shl(u32::from(bit)).unwrap_or(0)
}

/// Decode one record line.
#[must_use]
pub fn decode_line(line: &str, schema: &Schema) -> HostRecord {
    let columns: Vec<&str> = line
        .trim_end_matches(['\r', '\n'])
        .split(DELIMITER)
        .map(str::trim)
        .collect();
    let column = |index: usize| columns.get(index).copied().unwrap_or("");

    let mut record = HostRecord::default();
    for entry in schema.entries() {
        match entry {
            SchemaEntry::Verbatim {
                name,
                default,
                column: index,
                packed,
            } => {
                let raw = match column(*index) {
                    "" => *default,
                    raw => raw,
                };
                let value = if *packed {
                    FieldValue::Int(i64::from(parse_u32(raw)))
                } else {
                    FieldValue::from_column(raw)
                };
                record.fields.insert((*name).to_owned(), value);
            }
            SchemaEntry::Flag {
                name,
                column: index,
                bit,
                ..
            } => {
                let set = bit_is_set(parse_u32(column(*index)), *bit);
                record.set(name, yes_no(set));
            }
            SchemaEntry::Radio {
                name,
                column: index,
                members,
            } => {
                let word = parse_u32(column(*index));
                let value = members
                    .iter()
                    .find(|m| bit_is_set(word, m.bit))
                    .map_or("no", |m| m.value);
                record.set(name, value);
            }
            SchemaEntry::Toggle { column: index } => {
                ToggleGroup::parse(column(*index)).apply_to(&mut record);
            }
        }
    }
    record
}

/// Encode one record as a line without the trailing newline.
///
/// An empty `alias` field falls back to `alias`, the key the record is
/// stored under.
#[must_use]
pub fn encode_line(alias: &str, record: &HostRecord, schema: &Schema) -> String {
    let mut columns: Vec<Option<String>> = vec![None; schema.width()];

    for entry in schema.entries() {
        let index = entry.column();
        match entry {
            SchemaEntry::Verbatim {
                name,
                default,
                packed,
                ..
            } => {
                let text = record
                    .text(name)
                    .filter(|v| !v.is_empty())
                    .map_or_else(|| (*default).to_owned(), |v| v.into_owned());
                let text = if *name == ALIAS && text.is_empty() {
                    alias.to_owned()
                } else if *packed {
                    parse_u32(&text).to_string()
                } else {
                    text
                };
                columns[index] = Some(text);
            }
            SchemaEntry::Flag { name, bit, .. } => {
                let set = record.get(name).is_some_and(|v| v.is("yes"));
                apply_bit(&mut columns[index], *bit, set);
            }
            SchemaEntry::Radio { name, members, .. } => {
                let value = record.get(name);
                for member in members {
                    let set = value.is_some_and(|v| v.is("yes") || v.is(member.value));
                    apply_bit(&mut columns[index], member.bit, set);
                }
            }
            SchemaEntry::Toggle { .. } => {
                columns[index] = Some(ToggleGroup::from_record(record).emit());
            }
        }
    }

    let cells: Vec<String> = columns.into_iter().map(Option::unwrap_or_default).collect();
    cells.join(&DELIMITER.to_string())
}

fn apply_bit(slot: &mut Option<String>, bit: u8, set: bool) {
    let word = slot.as_deref().map_or(0, parse_u32);
    let word = if set {
        word | bit_mask(bit)
    } else {
        word & !bit_mask(bit)
    };
    *slot = Some(word.to_string());
}

/// Parse a whole HOST_CONFIG document.
///
/// Comment and blank lines before the first record form the header. Later
/// comment lines are dropped. A repeated alias keeps its first record.
#[must_use]
pub fn parse_document(text: &str, schema: &Schema) -> HostConfig {
    let mut config = HostConfig::default();
    let mut in_header = true;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            if in_header {
                config.header.push_str(line);
                config.header.push('\n');
            }
            continue;
        }
        in_header = false;

        let record = decode_line(line, schema);
        let Some(alias) = record.text(ALIAS).map(|a| a.into_owned()) else {
            continue;
        };
        if config.data.contains_key(&alias) {
            warn!(alias = %alias, "duplicate host alias ignored");
            continue;
        }
        config.order.push(alias.clone());
        config.data.insert(alias, record);
    }
    config
}

/// Render a HOST_CONFIG document: the header followed by one line per alias
/// in `order`. An alias without a record is written with defaults.
#[must_use]
pub fn render_document(header: &str, config: &HostConfig, schema: &Schema) -> String {
    let mut out = String::with_capacity(header.len() + config.order.len() * 96);
    out.push_str(header);
    if !header.is_empty() && !header.ends_with('\n') {
        out.push('\n');
    }
    let empty = HostRecord::default();
    for alias in &config.order {
        let record = config.data.get(alias).unwrap_or(&empty);
        out.push_str(&encode_line(alias, record, schema));
        out.push('\n');
    }
    out
}

/// Record seeded from the raw descriptor table: each descriptor writes its
/// radio value, or its default when it has none. Later descriptors of a
/// shared name overwrite earlier ones.
#[must_use]
pub fn fresh_record(schema: &Schema) -> HostRecord {
    let mut fields = BTreeMap::new();
    for field in schema.fields() {
        let seed = field.radio.unwrap_or(field.default);
        fields.insert(field.name.to_owned(), FieldValue::from_column(seed));
    }
    HostRecord {
        protocol_class: String::new(),
        fields,
    }
}
