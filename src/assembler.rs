//! Result Assembler.
//!
//! Merges the four section extractors' outputs into one structured result
//! keyed by settlement number, ready for a downstream persistence layer.
//! Grouping is strict: the trade header must be non-empty before any
//! grouping happens, and a settlement header with zero matched transactions
//! fails the run (no bank statement can derive from it). Transactions and
//! trailers whose key matches no settlement header are exposed as orphans
//! for downstream rejection.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::types::{
    Extraction, ImportResult, Record, SettlementGroup, TaxTotal, FILENAME_FIELD,
    SETTLEMENT_NUMBER_FIELD,
};

/// Group the flat extraction into settlements with their children.
pub fn assemble(extraction: Extraction) -> Result<ImportResult> {
    let Extraction {
        trade_header,
        settlements,
        transactions,
        trailers,
    } = extraction;

    // The only always-present field is the injected filename; a header
    // holding nothing else means the file had no recognizable header.
    if !trade_header.keys().any(|k| k != FILENAME_FIELD) {
        return Err(Error::EmptyTradeHeader);
    }
    if settlements.is_empty() {
        return Err(Error::NoSettlements);
    }

    let mut transactions_by_settlement: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for tx in transactions {
        let key = record_key(&tx, "transaction detail")?;
        transactions_by_settlement.entry(key).or_default().push(tx);
    }

    let mut trailers_by_settlement: BTreeMap<String, Vec<TaxTotal>> = BTreeMap::new();
    for trailer in trailers {
        if trailer.settlement_number.trim().is_empty() {
            return Err(Error::MissingSettlementNumber {
                section: "tax trailer",
            });
        }
        trailers_by_settlement
            .entry(trailer.settlement_number.clone())
            .or_default()
            .push(trailer);
    }

    let mut groups = Vec::with_capacity(settlements.len());
    let mut grouped_keys: BTreeSet<String> = BTreeSet::new();
    for header in settlements {
        let key = record_key(&header, "settlement header")?;

        // Duplicate settlement numbers each receive the full child set, so
        // lookups are non-consuming.
        let group_transactions = transactions_by_settlement
            .get(&key)
            .cloned()
            .unwrap_or_default();
        if group_transactions.is_empty() {
            return Err(Error::SettlementWithoutTransactions(key));
        }
        let group_trailers = trailers_by_settlement.get(&key).cloned().unwrap_or_default();

        grouped_keys.insert(key.clone());
        groups.push(SettlementGroup {
            settlement_number: key,
            header,
            transactions: group_transactions,
            trailers: group_trailers,
        });
    }

    let orphan_transactions = transactions_by_settlement
        .into_iter()
        .filter(|(k, _)| !grouped_keys.contains(k))
        .flat_map(|(_, v)| v)
        .collect();
    let orphan_trailers = trailers_by_settlement
        .into_iter()
        .filter(|(k, _)| !grouped_keys.contains(k))
        .flat_map(|(_, v)| v)
        .collect();

    Ok(ImportResult {
        trade_header,
        settlements: groups,
        orphan_transactions,
        orphan_trailers,
    })
}

fn record_key(record: &Record, section: &'static str) -> Result<String> {
    record
        .get(SETTLEMENT_NUMBER_FIELD)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(Error::MissingSettlementNumber { section })
}
