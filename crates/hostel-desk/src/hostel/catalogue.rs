//! Bulk room creation from a CSV export with the columns
//! `Room No,Capacity,Block`.

use std::io::Read;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use super::domain::{normalize_block, normalize_room_no, NewRoom};

#[derive(Debug, thiserror::Error)]
pub enum RoomImportError {
    #[error("failed to read room catalogue: {0}")]
    Csv(#[from] csv::Error),
}

/// A catalogue row that could not become a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based line number in the source file, header included.
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct RoomCatalogue {
    pub rooms: Vec<NewRoom>,
    pub rejected: Vec<RejectedRow>,
}

/// Totals reported after a catalogue has been written to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

#[derive(Debug, Deserialize)]
struct CatalogueRow {
    #[serde(rename = "Room No")]
    room_no: String,
    #[serde(rename = "Capacity")]
    capacity: String,
    #[serde(rename = "Block", default, deserialize_with = "empty_string_as_none")]
    block: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

impl RoomCatalogue {
    /// Parses every row. Malformed rows are collected in `rejected` rather
    /// than aborting the import; only unreadable CSV is an error.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RoomImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut catalogue = RoomCatalogue::default();

        for (index, record) in csv_reader.deserialize::<CatalogueRow>().enumerate() {
            let line = index as u64 + 2;
            let row = match record {
                Ok(row) => row,
                Err(err) if err.is_io_error() => return Err(err.into()),
                Err(err) => {
                    catalogue.reject(line, err.to_string());
                    continue;
                }
            };

            let room_no = normalize_room_no(&row.room_no);
            if room_no.is_empty() || room_no.len() > 50 {
                catalogue.reject(line, "room number must be 1 to 50 characters".to_string());
                continue;
            }

            match row.capacity.trim().parse::<u32>() {
                Ok(capacity) if capacity > 0 => catalogue.rooms.push(NewRoom {
                    room_no,
                    capacity,
                    block: normalize_block(row.block.as_deref()),
                }),
                _ => catalogue.reject(
                    line,
                    format!("capacity '{}' is not a positive integer", row.capacity),
                ),
            }
        }

        Ok(catalogue)
    }

    fn reject(&mut self, line: u64, reason: String) {
        warn!(line, %reason, "skipping room catalogue row");
        self.rejected.push(RejectedRow { line, reason });
    }
}
