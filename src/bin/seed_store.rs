// Load transfer transactions from a JSON file into the transaction store.
//
//   seed_store <transfers.json> [db path]
//
// File format: [{"hash": "<hex>", "signer": "...", "recipient": "...",
//                "height": 1, "mosaics": [{"id": "6BED913FA20223F8", "amount": 1000000}]}]
use eyre::{eyre, Result, WrapErr};
use mosaic_flow::{pipeline::parse_mosaic_id, store};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SeedMosaic {
    id: String,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct SeedTransfer {
    hash: String,
    signer: String,
    recipient: String,
    #[serde(default)]
    height: u64,
    mosaics: Vec<SeedMosaic>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .ok_or_else(|| eyre!("usage: seed_store <transfers.json> [db path]"))?;
    let db_path = args
        .next()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "catapult.db".to_string());

    let raw = std::fs::read_to_string(&input).wrap_err_with(|| format!("reading {}", input))?;
    let transfers: Vec<SeedTransfer> = serde_json::from_str(&raw)?;

    let mut conn = store::connect(&db_path)?;
    store::run_migrations(&conn)?;

    for t in &transfers {
        let mosaics = t
            .mosaics
            .iter()
            .map(|m| Ok((parse_mosaic_id(&m.id)?, m.amount)))
            .collect::<Result<Vec<_>>>()?;

        store::record_transfer(
            &mut conn,
            &store::StoredTransfer {
                hash: hex::decode(&t.hash).wrap_err_with(|| format!("bad hash {}", t.hash))?,
                signer_address: t.signer.clone(),
                recipient_address: t.recipient.clone(),
                height: t.height,
                mosaics,
            },
        )?;
    }

    info!("Seeded {} transfers into {}", transfers.len(), db_path);
    Ok(())
}
