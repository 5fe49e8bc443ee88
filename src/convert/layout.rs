//! Output column layout resolved from a profile and a source header
//!
//! Every output position is a [`Slot`]: either a mapped source column or a
//! calculated column. Rows are assembled by walking the slots, so a value can
//! never land at the wrong position regardless of where calculations are
//! spliced in.

use crate::core::formula;
use crate::types::{Profile, RowMap};
use std::collections::HashSet;

/// Where the value for one output column comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Source header label of a mapped column
    Source(String),
    /// Index into `Profile::calculations`
    Calculated(usize),
}

/// Resolved output header for one (profile, source header) pair
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    /// Output column names, in output order
    pub header: Vec<String>,
    /// Value source for each output column; parallel to `header`
    pub slots: Vec<Slot>,
    /// Mapped source columns absent from the source header, in profile order
    pub missing: Vec<String>,
    /// Source labels forming the duplicate key, in profile order
    pub key_columns: Vec<String>,
    /// Output position of each calculation, by calculation index
    calc_positions: Vec<usize>,
}

impl ColumnLayout {
    pub fn resolve(profile: &Profile, source_header: &[String]) -> Self {
        let present: HashSet<&str> = source_header.iter().map(|h| h.trim()).collect();

        let mut header = Vec::new();
        let mut slots = Vec::new();
        let mut missing = Vec::new();
        let mut key_columns = Vec::new();

        for mapping in &profile.columns {
            let source = mapping.source.trim();
            if present.contains(source) {
                header.push(mapping.output_name().to_string());
                slots.push(Slot::Source(source.to_string()));
                if mapping.unique_key {
                    key_columns.push(source.to_string());
                }
            } else {
                missing.push(source.to_string());
            }
        }

        // Anchor slot each calculation was spliced after, by calculation index
        let mut anchored_to: Vec<Option<Slot>> = vec![None; profile.calculations.len()];

        for (index, calc) in profile.calculations.iter().enumerate() {
            let anchor = calc
                .insert_after
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .and_then(|a| anchor_position(profile, &header, &slots, a));

            match anchor {
                Some(pos) => {
                    let anchor_slot = slots[pos].clone();
                    // Calculations sharing an anchor stay in declaration order
                    let mut at = pos + 1;
                    while let Some(Slot::Calculated(j)) = slots.get(at) {
                        if anchored_to[*j].as_ref() != Some(&anchor_slot) {
                            break;
                        }
                        at += 1;
                    }
                    header.insert(at, calc.new_column.clone());
                    slots.insert(at, Slot::Calculated(index));
                    anchored_to[index] = Some(anchor_slot);
                }
                None => {
                    header.push(calc.new_column.clone());
                    slots.push(Slot::Calculated(index));
                }
            }
        }

        let mut calc_positions = vec![0; profile.calculations.len()];
        for (pos, slot) in slots.iter().enumerate() {
            if let Slot::Calculated(index) = slot {
                calc_positions[*index] = pos;
            }
        }

        Self {
            header,
            slots,
            missing,
            key_columns,
            calc_positions,
        }
    }

    /// Mapped columns a later source header lacks, relative to this layout
    pub fn missing_from(&self, source_header: &[String]) -> Vec<String> {
        let present: HashSet<&str> = source_header.iter().map(|h| h.trim()).collect();
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Source(source) if !present.contains(source.as_str()) => Some(source.clone()),
                _ => None,
            })
            .collect()
    }

    /// Composite duplicate key for a row, or `None` when no key column is present.
    ///
    /// Each value is followed by a NUL separator.
    pub fn dedup_key(&self, row: &RowMap) -> Option<String> {
        if self.key_columns.is_empty() {
            return None;
        }
        let mut key = String::new();
        for column in &self.key_columns {
            if let Some(value) = row.get(column) {
                key.push_str(value);
            }
            key.push('\0');
        }
        Some(key)
    }

    /// Output values for one row.
    ///
    /// Calculations run in declaration order and their results are added to
    /// `row`, so a later formula may reference an earlier calculated column.
    pub fn assemble(&self, profile: &Profile, row: &mut RowMap) -> Vec<String> {
        let mut values: Vec<String> = self
            .slots
            .iter()
            .map(|slot| match slot {
                Slot::Source(source) => row.get(source).cloned().unwrap_or_default(),
                Slot::Calculated(_) => String::new(),
            })
            .collect();

        for (index, calc) in profile.calculations.iter().enumerate() {
            let result = formula::evaluate_calculation(calc, row);
            row.insert(calc.new_column.clone(), result.clone());
            if let Some(pos) = self.calc_positions.get(index) {
                values[*pos] = result;
            }
        }

        values
    }
}

/// Output position of an `insertAfter` anchor: an output name, or a mapped source name
fn anchor_position(profile: &Profile, header: &[String], slots: &[Slot], anchor: &str) -> Option<usize> {
    if let Some(pos) = header.iter().position(|h| h == anchor) {
        return Some(pos);
    }
    profile
        .columns
        .iter()
        .find(|m| m.source.trim() == anchor)
        .and_then(|m| {
            slots
                .iter()
                .position(|s| matches!(s, Slot::Source(src) if src == m.source.trim()))
        })
}
