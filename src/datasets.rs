//! Readers for the Movielens 100K ratings and item tables.
//!
//! Fetching and unpacking the archive is left to the caller: these
//! functions read the `u.data` and `u.item` files from a local directory.
use std::path::Path;

use failure::{self, Fail};
use tracing::info;

use crate::data::{parse_release_date, Item, Rating};

/// Dataset error types.
#[derive(Debug, Fail)]
pub enum DatasetError {
    /// The input file does not exist.
    #[fail(display = "Cannot find input file {}.", _0)]
    MissingFile(String),
    /// A record could not be interpreted.
    #[fail(display = "Malformed record on line {}: {}", line, reason)]
    MalformedRecord {
        /// One-based line number.
        line: u64,
        /// What was wrong with the record.
        reason: String,
    },
    /// A rating outside the 1-5 star range.
    #[fail(display = "Rating {} on line {} is outside the 1-5 range.", rating, line)]
    InvalidRating {
        /// One-based line number.
        line: u64,
        /// The offending rating.
        rating: u8,
    },
}

fn reader(path: &Path, delimiter: u8) -> Result<csv::Reader<std::fs::File>, failure::Error> {
    if !path.exists() {
        return Err(DatasetError::MissingFile(path.display().to_string()).into());
    }

    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)?)
}

fn line_of(position: Option<&csv::Position>) -> u64 {
    position.map(|position| position.line()).unwrap_or(0)
}

// Latin-1 maps each byte onto the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

/// Read a tab-separated `user_id item_id rating timestamp` table.
pub fn load_ratings<P: AsRef<Path>>(path: P) -> Result<Vec<Rating>, failure::Error> {
    let mut reader = reader(path.as_ref(), b'\t')?;
    let mut ratings = Vec::new();

    for record in reader.records() {
        let record = record?;
        let line = line_of(record.position());
        let rating: Rating = record.deserialize(None).map_err(|err| {
            DatasetError::MalformedRecord {
                line,
                reason: err.to_string(),
            }
        })?;

        if rating.stars() < 1 || rating.stars() > 5 {
            return Err(DatasetError::InvalidRating {
                line,
                rating: rating.stars(),
            }
            .into());
        }

        ratings.push(rating);
    }

    info!(path = %path.as_ref().display(), num_ratings = ratings.len(), "loaded ratings");

    Ok(ratings)
}

/// Read a pipe-separated, Latin-1 encoded `item_id|title|release_date|...` table.
///
/// Columns past the release date are ignored. Items with an unparsable
/// release date are kept without one.
pub fn load_items<P: AsRef<Path>>(path: P) -> Result<Vec<Item>, failure::Error> {
    let mut reader = reader(path.as_ref(), b'|')?;
    let mut items = Vec::new();

    for record in reader.byte_records() {
        let record = record?;
        let line = line_of(record.position());

        if record.len() < 2 {
            return Err(DatasetError::MalformedRecord {
                line,
                reason: format!("expected at least 2 fields, got {}", record.len()),
            }
            .into());
        }

        let id_field = decode_latin1(&record[0]);
        let item_id = id_field.trim().parse().map_err(|_| DatasetError::MalformedRecord {
            line,
            reason: format!("invalid item id {:?}", id_field),
        })?;
        let release_date = record
            .get(2)
            .and_then(|field| parse_release_date(&decode_latin1(field)));

        items.push(Item::new(item_id, decode_latin1(&record[1])).release_date(release_date));
    }

    info!(path = %path.as_ref().display(), num_items = items.len(), "loaded items");

    Ok(items)
}

/// Load the ratings (`u.data`) and items (`u.item`) of an unpacked
/// Movielens 100K directory.
pub fn load_movielens_100k<P: AsRef<Path>>(
    dir: P,
) -> Result<(Vec<Rating>, Vec<Item>), failure::Error> {
    let dir = dir.as_ref();

    Ok((load_ratings(dir.join("u.data"))?, load_items(dir.join("u.item"))?))
}
