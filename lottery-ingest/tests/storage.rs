use std::collections::BTreeSet;

use anyhow::Result;
use lottery_ingest::{
    bet::Bet,
    ledger::{FileLedger, MemoryLedger},
    storage::spawn_arbitrator,
};

const WRITERS: usize = 16;
const BATCH: usize = 25;

fn batch(writer: usize) -> Vec<Bet> {
    (0..BATCH)
        .map(|i| Bet {
            agency: (writer % 5) as u8 + 1,
            first_name: format!("writer-{writer}"),
            last_name: "Concurrent".into(),
            document: format!("{writer}-{i}"),
            birthdate: "1990-05-05".into(),
            number: i as i64,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stores_land_exactly_once() -> Result<()> {
    let (handle, task) = spawn_arbitrator(MemoryLedger::new());

    let writers: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.store_bets(batch(writer)).await })
        })
        .collect();
    for writer in writers {
        writer.await??;
    }

    let snapshot = handle.ledger_snapshot().await?;
    assert_eq!(snapshot.len(), WRITERS * BATCH);

    let stored: BTreeSet<_> = snapshot.iter().map(|bet| bet.document.clone()).collect();
    let expected: BTreeSet<_> = (0..WRITERS)
        .flat_map(batch)
        .map(|bet| bet.document)
        .collect();
    assert_eq!(stored, expected);

    // Every batch is contiguous: writes from different callers never interleave.
    for chunk in snapshot.chunks(BATCH) {
        let writer = &chunk[0].first_name;
        assert!(chunk.iter().all(|bet| &bet.first_name == writer));
    }

    handle.stop().await?;
    task.await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_ledger_keeps_batches_contiguous() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bets.jsonl");
    let (handle, task) = spawn_arbitrator(FileLedger::open(&path)?);

    let writers: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.store_bets(batch(writer)).await })
        })
        .collect();
    for writer in writers {
        writer.await??;
    }

    handle.stop().await?;
    task.await?;

    // Reopen after the arbitrator released the file.
    let (handle, task) = spawn_arbitrator(FileLedger::open(&path)?);
    let snapshot = handle.ledger_snapshot().await?;
    assert_eq!(snapshot.len(), WRITERS * BATCH);
    for chunk in snapshot.chunks(BATCH) {
        let writer = &chunk[0].first_name;
        assert!(chunk.iter().all(|bet| &bet.first_name == writer));
    }

    handle.stop().await?;
    task.await?;
    Ok(())
}
