use serde::Serialize;

use super::models::Entry;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MarkBand {
    Excellent,
    Good,
    Pass,
    Fail,
}

impl MarkBand {
    pub fn for_mark(mark: u8) -> Self {
        match mark {
            90..=u8::MAX => MarkBand::Excellent,
            70..=89 => MarkBand::Good,
            50..=69 => MarkBand::Pass,
            _ => MarkBand::Fail,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            MarkBand::Excellent => "#10b981",
            MarkBand::Good => "#3b82f6",
            MarkBand::Pass => "#f59e0b",
            MarkBand::Fail => "#ef4444",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRow {
    /// 1-based position in the list.
    pub index: usize,
    pub student_id: String,
    pub mark: u8,
    pub band: MarkBand,
    pub color: &'static str,
    pub timestamp: String,
}

/// Display model for the saved entries table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTable {
    pub count: usize,
    pub rows: Vec<RecordRow>,
}

impl RecordTable {
    pub fn from_entries(entries: &[Entry]) -> Self {
        let rows = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let band = MarkBand::for_mark(entry.mark);
                RecordRow {
                    index: position + 1,
                    student_id: entry.student_id.clone(),
                    mark: entry.mark,
                    band,
                    color: band.color(),
                    timestamp: entry.timestamp.clone(),
                }
            })
            .collect();

        Self {
            count: entries.len(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_thresholds() {
        assert_eq!(MarkBand::for_mark(100), MarkBand::Excellent);
        assert_eq!(MarkBand::for_mark(90), MarkBand::Excellent);
        assert_eq!(MarkBand::for_mark(89), MarkBand::Good);
        assert_eq!(MarkBand::for_mark(70), MarkBand::Good);
        assert_eq!(MarkBand::for_mark(50), MarkBand::Pass);
        assert_eq!(MarkBand::for_mark(49), MarkBand::Fail);
        assert_eq!(MarkBand::for_mark(0).color(), "#ef4444");
    }

    #[test]
    fn rows_are_numbered_in_store_order() {
        let entries = vec![
            Entry {
                id: 2,
                student_id: "B".into(),
                mark: 95,
                timestamp: "t2".into(),
            },
            Entry {
                id: 1,
                student_id: "A".into(),
                mark: 60,
                timestamp: "t1".into(),
            },
        ];

        let table = RecordTable::from_entries(&entries);
        assert_eq!(table.count, 2);
        assert_eq!(table.rows[0].index, 1);
        assert_eq!(table.rows[0].student_id, "B");
        assert_eq!(table.rows[0].color, "#10b981");
        assert_eq!(table.rows[1].band, MarkBand::Pass);
    }

    #[test]
    fn empty_table() {
        let table = RecordTable::from_entries(&[]);
        assert_eq!(table.count, 0);
        assert!(table.rows.is_empty());
    }
}
