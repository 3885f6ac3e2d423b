//! Text protocol result sets
//!
//! Only what a status query needs: column names from the column definition
//! packets and rows of length-encoded strings, keeping SQL `NULL` distinct
//! from the empty string.

/// Marker byte for a NULL column value in a text row
const NULL_VALUE: u8 = 0xFB;

/// Error while decoding a result set packet
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultSetError {
    #[error("Truncated packet")]
    Truncated,
    #[error("Invalid length encoding: {0:#04x}")]
    InvalidLength(u8),
    #[error("Invalid UTF-8 in column {0}")]
    InvalidUtf8(usize),
}

/// A fully read text result set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    /// Whether the query produced no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name (case-sensitive, as MySQL reports it)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `name` in row `row`.
    ///
    /// The outer `Option` is `None` when the column or row does not exist,
    /// the inner one when the value is SQL `NULL`.
    pub fn value(&self, row: usize, name: &str) -> Option<Option<&str>> {
        let idx = self.column_index(name)?;
        let row = self.rows.get(row)?;
        row.get(idx).map(|v| v.as_deref())
    }

    /// Decode a column definition packet (protocol 41) and return its name
    pub fn parse_column_name(payload: &[u8]) -> Result<String, ResultSetError> {
        let mut offset = 0;
        // catalog, schema, table, org_table precede the name
        for _ in 0..4 {
            let (_, used) = read_lenenc_bytes(&payload[offset..])?;
            offset += used;
        }
        let (name, _) = read_lenenc_bytes(&payload[offset..])?;
        let name = name.ok_or(ResultSetError::Truncated)?;
        String::from_utf8(name.to_vec()).map_err(|_| ResultSetError::InvalidUtf8(4))
    }

    /// Decode one text protocol row with `column_count` values
    pub fn parse_row(
        payload: &[u8],
        column_count: usize,
    ) -> Result<Vec<Option<String>>, ResultSetError> {
        let mut offset = 0;
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            let (value, used) = read_lenenc_bytes(&payload[offset..])?;
            offset += used;
            let value = value
                .map(|v| String::from_utf8(v.to_vec()).map_err(|_| ResultSetError::InvalidUtf8(idx)))
                .transpose()?;
            values.push(value);
        }
        Ok(values)
    }
}

/// Parse a length-encoded integer, returning the value and bytes consumed
pub fn read_lenenc_int(data: &[u8]) -> Result<(u64, usize), ResultSetError> {
    let first = *data.first().ok_or(ResultSetError::Truncated)?;
    let need = |n: usize| {
        if data.len() < n {
            Err(ResultSetError::Truncated)
        } else {
            Ok(())
        }
    };
    match first {
        0..=0xFA => Ok((first as u64, 1)),
        0xFC => {
            need(3)?;
            Ok((u16::from_le_bytes([data[1], data[2]]) as u64, 3))
        }
        0xFD => {
            need(4)?;
            Ok((u32::from_le_bytes([data[1], data[2], data[3], 0]) as u64, 4))
        }
        0xFE => {
            need(9)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[1..9]);
            Ok((u64::from_le_bytes(raw), 9))
        }
        other => Err(ResultSetError::InvalidLength(other)),
    }
}

/// Parse a length-encoded string; `None` for the NULL marker
fn read_lenenc_bytes(data: &[u8]) -> Result<(Option<&[u8]>, usize), ResultSetError> {
    if data.first() == Some(&NULL_VALUE) {
        return Ok((None, 1));
    }
    let (len, header) = read_lenenc_int(data)?;
    let end = header
        .checked_add(len as usize)
        .ok_or(ResultSetError::Truncated)?;
    if data.len() < end {
        return Err(ResultSetError::Truncated);
    }
    Ok((Some(&data[header..end]), end))
}
