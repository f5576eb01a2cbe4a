// src/store.rs
use rusqlite::{params, params_from_iter, types::Value, Connection};
use rust_decimal::Decimal;

use crate::models::TransferRecord;

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  hash              TEXT UNIQUE NOT NULL, -- hex encoded
  signer_address    TEXT NOT NULL,
  recipient_address TEXT NOT NULL,
  height            INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transaction_addresses (
  transaction_id INTEGER NOT NULL REFERENCES transactions(id),
  address        TEXT NOT NULL,
  UNIQUE(transaction_id, address)
);

CREATE INDEX IF NOT EXISTS idx_transaction_addresses_address
  ON transaction_addresses(address);

CREATE TABLE IF NOT EXISTS transaction_mosaics (
  transaction_id INTEGER NOT NULL REFERENCES transactions(id),
  position       INTEGER NOT NULL,
  mosaic_id      INTEGER NOT NULL, -- u64 stored as two's complement
  amount         INTEGER NOT NULL, -- raw units, u64 stored as two's complement
  UNIQUE(transaction_id, position)
);
"#;

/// A transfer transaction as it sits in the store
#[derive(Debug, Clone)]
pub struct StoredTransfer {
    pub hash: Vec<u8>,
    pub signer_address: String,
    pub recipient_address: String,
    pub height: u64,
    pub mosaics: Vec<(u64, u64)>, // (mosaic id, raw amount)
}

/// Open the transaction store (WAL mode)
pub fn connect(path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(INIT_SQL)
}

/// Liveness probe used by the connection provider
pub fn ping(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
    Ok(())
}

/// Insert a transfer with its address index and mosaics. Re-inserting the same
/// hash is a no-op.
pub fn record_transfer(conn: &mut Connection, transfer: &StoredTransfer) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    let hash = hex::encode_upper(&transfer.hash);

    let inserted = tx.execute(
        r#"
        INSERT INTO transactions (hash, signer_address, recipient_address, height)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(hash) DO NOTHING
        "#,
        params![
            hash,
            transfer.signer_address,
            transfer.recipient_address,
            transfer.height as i64
        ],
    )?;

    if inserted > 0 {
        let id = tx.last_insert_rowid();
        for address in [&transfer.signer_address, &transfer.recipient_address] {
            tx.execute(
                "INSERT OR IGNORE INTO transaction_addresses (transaction_id, address) VALUES (?1, ?2)",
                params![id, address],
            )?;
        }
        for (position, (mosaic_id, amount)) in transfer.mosaics.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO transaction_mosaics (transaction_id, position, mosaic_id, amount)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![id, position as i64, *mosaic_id as i64, *amount as i64],
            )?;
        }
    }

    tx.commit()
}

/// Scale a raw integer amount down by `divisibility` decimal places
pub fn scale_amount(raw: u64, divisibility: u8) -> Option<Decimal> {
    Decimal::try_from_i128_with_scale(raw as i128, divisibility as u32).ok()
}

/// Stream every matching mosaic transfer touching `addresses` into `emit`, in
/// store order. `emit` returns `false` to stop early. Returns the number of
/// records emitted.
pub fn query_transfers<F>(
    conn: &Connection,
    addresses: &[String],
    mosaic_id: u64,
    divisibility: u8,
    mut emit: F,
) -> rusqlite::Result<usize>
where
    F: FnMut(TransferRecord) -> bool,
{
    if addresses.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; addresses.len()].join(", ");
    let sql = format!(
        r#"
        SELECT t.hash, t.signer_address, t.recipient_address, m.amount
        FROM transactions t
        JOIN transaction_mosaics m ON m.transaction_id = t.id
        WHERE m.mosaic_id = ?
          AND t.id IN (
            SELECT transaction_id FROM transaction_addresses WHERE address IN ({placeholders})
          )
        ORDER BY t.id, m.position
        "#
    );

    let mut values = Vec::with_capacity(addresses.len() + 1);
    values.push(Value::Integer(mosaic_id as i64));
    values.extend(addresses.iter().map(|a| Value::Text(a.clone())));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(values))?;

    let mut emitted = 0;
    while let Some(row) = rows.next()? {
        let raw: i64 = row.get(3)?;
        let amount = scale_amount(raw as u64, divisibility).ok_or_else(|| {
            rusqlite::Error::IntegralValueOutOfRange(3, raw)
        })?;

        let record = TransferRecord {
            hash: row.get(0)?,
            sender: row.get(1)?,
            recipient: row.get(2)?,
            amount,
        };
        emitted += 1;
        if !emit(record) {
            break;
        }
    }

    Ok(emitted)
}
