//! Flattens datasets into a plain-text narrative and slices it into bounded chunks.
//!
//! Every row of every active sheet is rendered; nothing is sampled or summarized.
//! Chunks are cut at fixed character offsets, so a boundary may fall in the middle
//! of a row's line.

use crate::dataset::{Dataset, Sheet};

/// Maximum characters per chunk sent to the model in one request.
pub const CHUNK_LIMIT: usize = 300_000;

/// Marker used for missing or empty cells.
const MISSING_VALUE: &str = "N/A";

/// Render all active sheets of all datasets into one narrative string.
pub fn build_narrative(datasets: &[Dataset]) -> String {
    let mut narrative = String::new();

    for dataset in datasets {
        for sheet in dataset.active_sheets() {
            render_sheet(&mut narrative, &dataset.name, sheet);
        }
    }

    narrative
}

fn render_sheet(out: &mut String, file_name: &str, sheet: &Sheet) {
    out.push_str(&format!(
        "\nFILE: {} | SHEET: {}\nHEADERS: {}\n",
        file_name,
        sheet.name,
        sheet.headers.join(", ")
    ));

    for (idx, row) in sheet.rows.iter().enumerate() {
        let line = sheet
            .headers
            .iter()
            .map(|h| match row.get(h) {
                Some(value) if !value.is_empty() => format!("{}:{}", h, value),
                _ => format!("{}:{}", h, MISSING_VALUE),
            })
            .collect::<Vec<_>>()
            .join(" | ");
        out.push_str(&format!("Row {}: {}\n", idx + 1, line));
    }
}

/// Build the narrative for `datasets` and split it at [`CHUNK_LIMIT`].
pub fn build_chunks(datasets: &[Dataset]) -> Vec<String> {
    split_narrative(&build_narrative(datasets), CHUNK_LIMIT)
}

/// Split `narrative` into consecutive slices of at most `limit` characters.
///
/// A narrative that fits (including an empty one) comes back as a single chunk.
pub fn split_narrative(narrative: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let total_chars = narrative.chars().count();

    if total_chars <= limit {
        return vec![narrative.to_string()];
    }

    let mut chunks = Vec::with_capacity(total_chars.div_ceil(limit));
    let mut start = 0;
    let mut count = 0;

    for (byte_idx, _) in narrative.char_indices() {
        if count == limit {
            chunks.push(narrative[start..byte_idx].to_string());
            start = byte_idx;
            count = 0;
        }
        count += 1;
    }
    chunks.push(narrative[start..].to_string());

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CellValue, Row, Sheet};

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn sales_dataset() -> Dataset {
        let headers = vec!["region".to_string(), "total".to_string()];
        let north = Sheet::new(
            "North",
            headers.clone(),
            vec![
                row(&[("region", "N1".into()), ("total", 10.0.into())]),
                row(&[("region", "N2".into())]),
            ],
        );
        let south = Sheet::new(
            "South",
            headers,
            vec![row(&[("region", "S1".into()), ("total", CellValue::Empty)])],
        );
        Dataset::new("sales.xlsx", vec![north, south])
    }

    #[test]
    fn test_narrative_format() {
        let narrative = build_narrative(&[sales_dataset()]);
        let expected = "\nFILE: sales.xlsx | SHEET: North\nHEADERS: region, total\n\
                        Row 1: region:N1 | total:10\n\
                        Row 2: region:N2 | total:N/A\n\
                        \nFILE: sales.xlsx | SHEET: South\nHEADERS: region, total\n\
                        Row 1: region:S1 | total:N/A\n";
        assert_eq!(narrative, expected);
    }

    #[test]
    fn test_inactive_sheet_excluded_without_renumbering() {
        let mut ds = sales_dataset();
        ds.toggle_sheet("North");
        let narrative = build_narrative(&[ds]);
        assert!(!narrative.contains("SHEET: North"));
        assert!(!narrative.contains("N1"));
        assert!(narrative.contains("Row 1: region:S1 | total:N/A"));
    }

    #[test]
    fn test_zero_is_not_missing() {
        let sheet = Sheet::new(
            "S",
            vec!["v".to_string()],
            vec![row(&[("v", 0.0.into())])],
        );
        let narrative = build_narrative(&[Dataset::new("f.csv", vec![sheet])]);
        assert!(narrative.contains("Row 1: v:0\n"));
    }

    #[test]
    fn test_small_narrative_single_chunk() {
        let datasets = vec![sales_dataset()];
        let chunks = build_chunks(&datasets);
        assert_eq!(chunks, vec![build_narrative(&datasets)]);
    }

    #[test]
    fn test_empty_narrative_single_empty_chunk() {
        assert_eq!(build_chunks(&[]), vec![String::new()]);
    }

    #[test]
    fn test_split_is_lossless() {
        let narrative = "abcdefghij".repeat(7); // 70 chars
        let chunks = split_narrative(&narrative, 30);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 30);
        assert_eq!(chunks[2].len(), 10);
        assert_eq!(chunks.concat(), narrative);
    }

    #[test]
    fn test_split_exact_multiple() {
        let narrative = "x".repeat(60);
        let chunks = split_narrative(&narrative, 30);
        assert_eq!(chunks.len(), 2);
        assert_eq!(split_narrative(&narrative, 60).len(), 1);
    }

    #[test]
    fn test_split_counts_chars_not_bytes() {
        let narrative = "ñáé".repeat(4); // 12 chars, 24 bytes
        let chunks = split_narrative(&narrative, 5);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 5);
        assert_eq!(chunks.concat(), narrative);
    }

    #[test]
    fn test_large_dataset_splits_at_chunk_limit() {
        let rows: Vec<Row> = (0..20_000)
            .map(|i| row(&[("id", CellValue::Text(format!("{:010}", i)))]))
            .collect();
        let sheet = Sheet::new("Big", vec!["id".to_string()], rows);
        let datasets = vec![Dataset::new("big.csv", vec![sheet])];

        let narrative = build_narrative(&datasets);
        let len = narrative.chars().count();
        assert!(len > CHUNK_LIMIT);

        let chunks = build_chunks(&datasets);
        assert_eq!(chunks.len(), len.div_ceil(CHUNK_LIMIT));
        assert!(chunks.iter().all(|c| c.chars().count() <= CHUNK_LIMIT));
        assert_eq!(chunks.concat(), narrative);
    }
}
