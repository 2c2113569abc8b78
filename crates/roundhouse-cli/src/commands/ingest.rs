//! Journal ingest from JSONL event files.
//!
//! Each input line is one serialized event envelope. The whole file is
//! appended as a single transaction, so a malformed line or an
//! out-of-order envelope leaves the journal untouched.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use roundhouse_core::{EventEnvelope, SqliteJournal};

/// Append the envelopes in `input` to the journal at `journal_path`.
///
/// `input` of `-` reads from stdin.
pub fn run(journal_path: &Path, input: &Path) -> Result<()> {
    let contents = if input.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read events from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("failed to read events from {}", input.display()))?
    };

    let envelopes = parse_jsonl(&contents)?;
    if envelopes.is_empty() {
        println!("No events to ingest");
        return Ok(());
    }

    let journal = SqliteJournal::open(journal_path)
        .with_context(|| format!("failed to open journal at {}", journal_path.display()))?;
    let seq_ids = journal
        .append_batch(&envelopes)
        .context("failed to append events")?;

    println!(
        "Ingested {} event(s): seq {}..={}",
        seq_ids.len(),
        seq_ids.first().copied().unwrap_or(0),
        seq_ids.last().copied().unwrap_or(0),
    );
    Ok(())
}

fn parse_jsonl(contents: &str) -> Result<Vec<EventEnvelope>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid event envelope on line {}", index + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256, U256};
    use roundhouse_core::ChainEvent;

    use super::*;

    fn envelope_line(block: u64) -> String {
        serde_json::to_string(&EventEnvelope {
            block_number: block,
            block_timestamp: 1_000 + block,
            tx_hash: B256::repeat_byte(block as u8),
            log_index: 0,
            event: ChainEvent::Deposit {
                depositor: Address::repeat_byte(0x11),
                token: Address::repeat_byte(0xa1),
                amount: U256::from(5u64),
            },
        })
        .unwrap()
    }

    #[test]
    fn parses_lines_and_skips_blanks() {
        let contents = format!("{}\n\n{}\n", envelope_line(1), envelope_line(2));
        let envelopes = parse_jsonl(&contents).unwrap();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[1].block_number, 2);
    }

    #[test]
    fn reports_the_offending_line() {
        let contents = format!("{}\nnot json\n", envelope_line(1));
        let err = parse_jsonl(&contents).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn ingest_writes_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.jsonl");
        std::fs::write(&input, format!("{}\n{}\n", envelope_line(1), envelope_line(2))).unwrap();

        let journal_path = dir.path().join("journal.db");
        run(&journal_path, &input).unwrap();

        let journal = SqliteJournal::open(&journal_path).unwrap();
        assert_eq!(journal.head().unwrap(), 2);
    }
}
