// transfer_search.rs
// Pure search/filter over the transfer ledger
//
// No side effects and no allocation beyond the result vector; cheap enough
// to run on every keystroke. Result order follows ledger order.

use crate::transfer_ledger::{TransferDirection, TransferRecord};
use serde::{Deserialize, Serialize};

/// Direction restriction applied before the text search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionFilter {
    #[default]
    All,
    Sent,
    Received,
}

impl DirectionFilter {
    fn matches(&self, direction: TransferDirection) -> bool {
        match self {
            DirectionFilter::All => true,
            DirectionFilter::Sent => direction == TransferDirection::Sent,
            DirectionFilter::Received => direction == TransferDirection::Received,
        }
    }
}

/// Filter `records` by direction, then keep records where the
/// case-insensitive `text` is a substring of the file name, the peer id or
/// the MIME type (any one match suffices). Blank text keeps everything.
pub fn query<'a>(
    records: &'a [TransferRecord],
    text: &str,
    filter: DirectionFilter,
) -> Vec<&'a TransferRecord> {
    let needle = text.trim().to_lowercase();

    records
        .iter()
        .filter(|record| filter.matches(record.direction))
        .filter(|record| {
            if needle.is_empty() {
                return true;
            }
            record.file_name.to_lowercase().contains(&needle)
                || record.peer_id.to_lowercase().contains(&needle)
                || record.file_type.to_lowercase().contains(&needle)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        file_name: &str,
        peer_id: &str,
        file_type: &str,
        direction: TransferDirection,
    ) -> TransferRecord {
        TransferRecord::new(file_name, 1024, file_type, direction, peer_id)
    }

    #[test]
    fn test_search_is_case_insensitive_across_all_three_fields() {
        let records = vec![record(
            "Report.PDF",
            "GABC123",
            "application/pdf",
            TransferDirection::Sent,
        )];

        // Peer id match.
        assert_eq!(query(&records, "abc", DirectionFilter::All).len(), 1);
        // File name match, case-insensitive.
        assert_eq!(query(&records, "report", DirectionFilter::All).len(), 1);
        // MIME type match.
        assert_eq!(query(&records, "PDF", DirectionFilter::All).len(), 1);
        // No field matches.
        assert!(query(&records, "zip", DirectionFilter::All).is_empty());
    }

    #[test]
    fn test_direction_filter_applies_before_text() {
        let records = vec![
            record("a.txt", "p1", "text/plain", TransferDirection::Sent),
            record("b.txt", "p1", "text/plain", TransferDirection::Received),
        ];

        let sent = query(&records, "", DirectionFilter::Sent);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].file_name, "a.txt");

        assert!(query(&records, "b.txt", DirectionFilter::Sent).is_empty());
        assert_eq!(query(&records, "b.txt", DirectionFilter::Received).len(), 1);
    }

    #[test]
    fn test_blank_and_whitespace_text_keep_everything() {
        let records = vec![
            record("a.txt", "p1", "text/plain", TransferDirection::Sent),
            record("b.txt", "p2", "text/plain", TransferDirection::Received),
        ];
        assert_eq!(query(&records, "", DirectionFilter::All).len(), 2);
        assert_eq!(query(&records, "   ", DirectionFilter::All).len(), 2);
    }

    #[test]
    fn test_result_preserves_ledger_order() {
        let records = vec![
            record("newest.txt", "p1", "text/plain", TransferDirection::Sent),
            record("middle.txt", "p1", "text/plain", TransferDirection::Sent),
            record("oldest.txt", "p1", "text/plain", TransferDirection::Sent),
        ];
        let hits = query(&records, "txt", DirectionFilter::All);
        let names: Vec<&str> = hits.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["newest.txt", "middle.txt", "oldest.txt"]);
    }
}
