//! Column layout of `HOST_CONFIG`.
//!
//! [`HOST_CONFIG_FIELDS`] lists every logical field in a fixed order. The
//! order matters: the encoder walks it front to back, so a verbatim column
//! that also carries bit flags (host status) is written before its bits are
//! applied. [`Schema`] folds the flat table into one [`SchemaEntry`] per
//! logical field.

use std::sync::OnceLock;

/// How a field is stored in its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitSpec {
    /// The column holds the value as text.
    Verbatim,
    /// A single bit of the column's 32-bit unsigned value.
    Bit(u8),
    /// Part of the host-switch cell (`{cc}`, `[cc]` or empty).
    ToggleGroup,
}

/// One descriptor of the field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Key in the decoded record.
    pub name: &'static str,
    /// Value selected when this descriptor's bit is set; shared names form a radio group.
    pub radio: Option<&'static str>,
    /// Value used when the column is empty or missing.
    pub default: &'static str,
    /// Zero-based column index.
    pub column: usize,
    /// Storage of the field inside its column.
    pub bits: BitSpec,
}

const fn text(name: &'static str, default: &'static str, column: usize) -> FieldSpec {
    FieldSpec {
        name,
        radio: None,
        default,
        column,
        bits: BitSpec::Verbatim,
    }
}

const fn flag(name: &'static str, default: &'static str, column: usize, bit: u8) -> FieldSpec {
    FieldSpec {
        name,
        radio: None,
        default,
        column,
        bits: BitSpec::Bit(bit),
    }
}

const fn radio(
    name: &'static str,
    value: &'static str,
    default: &'static str,
    column: usize,
    bit: u8,
) -> FieldSpec {
    FieldSpec {
        name,
        radio: Some(value),
        default,
        column,
        bits: BitSpec::Bit(bit),
    }
}

const fn toggle(name: &'static str, default: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        radio: None,
        default,
        column: TOGGLE_COLUMN,
        bits: BitSpec::ToggleGroup,
    }
}

/// Column of the host-switch cell.
pub const TOGGLE_COLUMN: usize = 3;

/// Host switching enabled (`yes`/`no`).
pub const SWITCH_ENABLE: &str = "host_switch_enable";
/// First toggle character.
pub const SWITCH_CHAR1: &str = "host_switch_char1";
/// Second toggle character.
pub const SWITCH_CHAR2: &str = "host_switch_char2";
/// Automatic (`{}`) rather than manual (`[]`) switching.
pub const SWITCH_AUTO: &str = "host_switch_auto";

/// Name of the alias field (column 0).
pub const ALIAS: &str = "alias";

/// Every HOST_CONFIG field in encode order.
pub const HOST_CONFIG_FIELDS: &[FieldSpec] = &[
    // AH, HN1, HN2
    text(ALIAS, "", 0),
    text("host_name_real1", "", 1),
    text("host_name_real2", "", 2),
    // HT: yes={}, no=[]
    toggle(SWITCH_ENABLE, "no"),
    toggle(SWITCH_CHAR1, ""),
    toggle(SWITCH_CHAR2, ""),
    toggle(SWITCH_AUTO, "no"),
    // PXY, AT, ME, RI, TB, SR, FSO, TT, NB
    text("proxy_name", "", 4),
    text("max_parallel_transfer", "3", 5),
    text("max_errors", "10", 6),
    text("retry_interval", "120", 7),
    text("transfer_block_size", "4 KB", 8),
    text("successful_retries", "0", 9),
    text("filesize_offset_for_append", "null", 10),
    text("transfer_timeout", "60", 11),
    text("no_burst", "0", 12),
    // HS: raw status word, plus the two bits the edit page owns.
    text("host_status", "0", 13),
    flag("ignore_error_warning", "no", 13, 4),
    flag("do_not_delete", "no", 13, 15),
    // SF: special flags.
    flag("ftp_mode_passive", "no", 14, 0),
    flag("ftp_idle_time", "no", 14, 1),
    flag("ftp_keep_alive", "no", 14, 2),
    flag("ftp_fast_rename", "no", 14, 3),
    flag("ftp_fast_cd", "no", 14, 4),
    flag("ftp_no_type_i", "no", 14, 5),
    flag("ftp_mode_epsv", "no", 14, 6),
    flag("disable_burst", "no", 14, 7),
    flag("ftp_allow_redirect", "no", 14, 8),
    flag("use_local_scheme", "no", 14, 9),
    flag("tcp_keep_alive", "no", 14, 10),
    flag("sequence_locking", "no", 14, 11),
    flag("enable_compress", "no", 14, 12),
    flag("keep_timestamp", "no", 14, 13),
    flag("sort_names", "no", 14, 14),
    flag("no_ageing_jobs", "no", 14, 15),
    flag("check_local_remote_match_size", "no", 14, 16),
    flag("is_timeout_transfer", "no", 14, 17),
    radio("keep_connected_direction", "send", "no", 14, 18),
    radio("keep_connected_direction", "fetch", "no", 14, 19),
    flag("ftps_clear_ctrlcon", "no", 14, 20),
    flag("ftp_use_list", "no", 14, 21),
    flag("tls_strict_verification", "no", 14, 22),
    flag("ftp_disable_mlst", "no", 14, 23),
    flag("keep_connected_disconnect", "no", 14, 24),
    // TRL, TTL, SSB, SRB, DT
    text("transfer_rate_limit", "0", 15),
    text("time_to_live", "0", 16),
    text("socket_send_buffer", "0", 17),
    text("socket_receive_buffer", "0", 18),
    text("dupcheck_timeout", "0", 19),
    // DF: duplicate check flags.
    radio("dupcheck_type", "name", "no", 20, 0),
    radio("dupcheck_type", "content", "no", 20, 1),
    radio("dupcheck_type", "name-content", "no", 20, 2),
    radio("dupcheck_type", "name-no-suffix", "no", 20, 3),
    radio("dupcheck_type", "name-size", "no", 20, 4),
    radio("dupcheck_crc", "crc32", "no", 20, 15),
    radio("dupcheck_crc", "crc32c", "no", 20, 16),
    flag("dupcheck_delete", "yes", 20, 23),
    flag("dupcheck_store", "no", 20, 24),
    flag("dupcheck_warn", "no", 20, 25),
    flag("dupcheck_timeout_fixed", "no", 20, 30),
    radio("dupcheck_reference", "recipient", "no", 20, 31),
    // KC, WT [secs]
    text("keep_connected", "0", 21),
    text("warn_time", "0", 22),
];

/// One selectable value of a radio group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioMember {
    /// Bit position inside the column.
    pub bit: u8,
    /// Value the field takes when this bit is set.
    pub value: &'static str,
}

/// One logical field, resolved from one or more descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaEntry {
    /// Text column.
    ///
    /// `packed` is set when bit entries share the column; the text is then
    /// the base 32-bit word the bits are applied to.
    Verbatim {
        /// Field name.
        name: &'static str,
        /// Fallback value.
        default: &'static str,
        /// Column index.
        column: usize,
        /// Column also carries bit flags.
        packed: bool,
    },
    /// Single yes/no bit.
    Flag {
        /// Field name.
        name: &'static str,
        /// Value seeded into fresh records.
        default: &'static str,
        /// Column index.
        column: usize,
        /// Bit position.
        bit: u8,
    },
    /// Enum over several bits of one column.
    ///
    /// Decoding picks the first member, in table order, whose bit is set and
    /// yields `"no"` when none is. This is the conflict-resolution rule for
    /// several descriptors writing the same field: a later descriptor only
    /// replaces a value that is still `"no"` or still the default, so the
    /// earliest set bit always wins.
    Radio {
        /// Field name.
        name: &'static str,
        /// Column index.
        column: usize,
        /// Members in table order.
        members: Vec<RadioMember>,
    },
    /// The four host-switch fields packed in one cell.
    Toggle {
        /// Column index.
        column: usize,
    },
}

impl SchemaEntry {
    /// Column this entry reads from and writes to.
    #[must_use]
    pub fn column(&self) -> usize {
        match self {
            Self::Verbatim { column, .. }
            | Self::Flag { column, .. }
            | Self::Radio { column, .. }
            | Self::Toggle { column } => *column,
        }
    }
}

/// The field table folded into logical entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: &'static [FieldSpec],
    entries: Vec<SchemaEntry>,
    width: usize,
}

impl Schema {
    /// Build a schema from a field table.
    ///
    /// Descriptors with a bit position that share a name become one
    /// [`SchemaEntry::Radio`] placed where the name first appears. All
    /// toggle descriptors become a single [`SchemaEntry::Toggle`].
    #[must_use]
    pub fn from_fields(fields: &'static [FieldSpec]) -> Self {
        let packed_columns: Vec<usize> = fields
            .iter()
            .filter(|f| matches!(f.bits, BitSpec::Bit(_)))
            .map(|f| f.column)
            .collect();

        let mut entries: Vec<SchemaEntry> = Vec::new();
        for (index, field) in fields.iter().enumerate() {
            match field.bits {
                BitSpec::Verbatim => entries.push(SchemaEntry::Verbatim {
                    name: field.name,
                    default: field.default,
                    column: field.column,
                    packed: packed_columns.contains(&field.column),
                }),
                BitSpec::ToggleGroup => {
                    if !entries
                        .iter()
                        .any(|e| matches!(e, SchemaEntry::Toggle { .. }))
                    {
                        entries.push(SchemaEntry::Toggle {
                            column: field.column,
                        });
                    }
                }
                BitSpec::Bit(bit) => {
                    let seen = fields[..index].iter().any(|f| f.name == field.name);
                    if seen {
                        continue;
                    }
                    let siblings: Vec<&FieldSpec> = fields[index..]
                        .iter()
                        .filter(|f| f.name == field.name)
                        .collect();
                    entries.push(bit_entry(field, bit, &siblings));
                }
            }
        }

        let width = fields.iter().map(|f| f.column + 1).max().unwrap_or(0);
        Self {
            fields,
            entries,
            width,
        }
    }

    /// Schema of the engine's HOST_CONFIG.
    #[must_use]
    pub fn host_config() -> &'static Self {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| Self::from_fields(HOST_CONFIG_FIELDS))
    }

    /// Logical entries in encode order.
    #[must_use]
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// Raw descriptor table.
    #[must_use]
    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    /// Number of physical columns in a record line.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Radio entry for `name`, if that field is an enum.
    #[must_use]
    pub fn radio(&self, name: &str) -> Option<&[RadioMember]> {
        self.entries.iter().find_map(|entry| match entry {
            SchemaEntry::Radio {
                name: n, members, ..
            } if *n == name => Some(members.as_slice()),
            _ => None,
        })
    }
}

fn bit_entry(first: &FieldSpec, bit: u8, siblings: &[&FieldSpec]) -> SchemaEntry {
    if siblings.len() == 1 && first.radio.is_none() {
        return SchemaEntry::Flag {
            name: first.name,
            default: first.default,
            column: first.column,
            bit,
        };
    }
    let members = siblings
        .iter()
        .filter_map(|f| match f.bits {
            BitSpec::Bit(bit) => Some(RadioMember {
                bit,
                value: f.radio.unwrap_or("yes"),
            }),
            _ => None,
        })
        .collect();
    SchemaEntry::Radio {
        name: first.name,
        column: first.column,
        members,
    }
}
